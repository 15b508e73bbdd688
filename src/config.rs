use std::{env, str::FromStr};

use anyhow::Context;
use rust_decimal::Decimal;

/// Ledger wide settings. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub default_daily_limit: Decimal,
    pub default_monthly_limit: Decimal,
    pub currency: String,
    pub iban_country: String,
    pub iban_check_digits: String,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub baseline_risk_score: Decimal,
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: Decimal::new(10_000_00, 2),
            default_monthly_limit: Decimal::new(100_000_00, 2),
            currency: "BRL".to_string(),
            iban_country: "BR".to_string(),
            iban_check_digits: "00".to_string(),
            default_page_size: 50,
            max_page_size: 100,
            baseline_risk_score: Decimal::new(10, 1),
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Reads `LEDGER_*` variables, loading `.env` first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            default_daily_limit: parse_or(&lookup, "LEDGER_DAILY_LIMIT", defaults.default_daily_limit)?,
            default_monthly_limit: parse_or(
                &lookup,
                "LEDGER_MONTHLY_LIMIT",
                defaults.default_monthly_limit,
            )?,
            currency: lookup("LEDGER_CURRENCY").unwrap_or(defaults.currency),
            iban_country: lookup("LEDGER_IBAN_COUNTRY").unwrap_or(defaults.iban_country),
            iban_check_digits: lookup("LEDGER_IBAN_CHECK_DIGITS")
                .unwrap_or(defaults.iban_check_digits),
            default_page_size: parse_or(&lookup, "LEDGER_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: parse_or(&lookup, "LEDGER_MAX_PAGE_SIZE", defaults.max_page_size)?,
            baseline_risk_score: parse_or(
                &lookup,
                "LEDGER_BASELINE_RISK_SCORE",
                defaults.baseline_risk_score,
            )?,
            log_level: lookup("LEDGER_LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        if config.default_page_size > config.max_page_size {
            anyhow::bail!(
                "LEDGER_PAGE_SIZE ({}) must not exceed LEDGER_MAX_PAGE_SIZE ({})",
                config.default_page_size,
                config.max_page_size
            );
        }
        Ok(config)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value `{raw}` for {key}")),
        None => Ok(default),
    }
}
