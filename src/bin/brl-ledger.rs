use std::{fs::File, sync::Arc};

use anyhow::{Context, Result};
use brl_ledger::{
    bin_utils::{RowError, Service},
    config::LedgerConfig,
    error::ErrorKind,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let config = LedgerConfig::from_env()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        config: Arc::new(config),
        error_printer: Box::new(|line, err| match err {
            RowError::Malformed(reason) => eprintln!("Error at line {line}: {reason}"),
            RowError::Rejected(err) if err.kind() == ErrorKind::Execution => {
                eprintln!("Error at line {line}: {err}")
            }
            // rejected requests are business outcomes, already logged
            RowError::Rejected(_) => {}
        }),
    };
    service.run()
}
