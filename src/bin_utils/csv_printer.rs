use std::io::Write;

use crate::{account::Account, currency::format_brl};
use anyhow::Context;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AccountRow {
    pub account: u64,
    pub number: String,
    pub owner: u64,
    pub balance: Decimal,
    pub formatted: String,
    pub active: bool,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            account: account.id().0,
            number: account.account_number().to_string(),
            owner: account.owner_id().0,
            balance: account.balance(),
            formatted: format_brl(account.balance()),
            active: account.is_active(),
        }
    }
}

pub fn print_accounts<W>(
    output: &mut W,
    accounts: impl IntoIterator<Item = AccountRow>,
) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for row in accounts {
        writer
            .serialize(&row)
            .with_context(|| format!("Failed to write account {}", row.account))?;
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}
