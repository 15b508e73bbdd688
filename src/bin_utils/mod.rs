//! Replays a CSV list of ledger operations against a fresh
//! [`InMemoryTransferProcessor`] and prints the resulting accounts.

use std::{
    collections::HashMap,
    io::{Read, Write},
    str::FromStr,
    sync::Arc,
};

use crate::{
    account::{AccountId, OwnerId},
    command::{CreateAccountCommand, TransferRequest},
    config::LedgerConfig,
    error::ProcessError,
    identity::PixKey,
    processor::{TransferProcessor, in_memory_processor::InMemoryTransferProcessor},
};
use anyhow::Result;
use csv_parser::{CsvOperationParser, Operation, Row};
use csv_printer::{AccountRow, print_accounts};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;
pub mod csv_parser;
pub mod csv_printer;

#[derive(Debug, Error)]
pub enum RowError {
    #[error("{0}")]
    Malformed(String),
    #[error(transparent)]
    Rejected(#[from] ProcessError),
}

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub config: Arc<LedgerConfig>,
    pub error_printer: Box<dyn FnMut(u64, RowError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);

        let processor = InMemoryTransferProcessor::new(self.config);
        let mut replay = Replay {
            processor: &processor,
            transfers: HashMap::new(),
        };

        for (line, row) in parser {
            let outcome = row
                .map_err(|err| RowError::Malformed(err.to_string()))
                .and_then(|row| replay.apply(row));
            if let Err(err) = outcome {
                (self.error_printer)(line, err);
            }
        }

        let accounts = processor.ledger().all_accounts();
        print_accounts(self.output, accounts.iter().map(AccountRow::from))
    }
}

struct Replay<'p> {
    processor: &'p InMemoryTransferProcessor,
    /// Transfer labels seen so far, for `cancel` rows.
    transfers: HashMap<String, Uuid>,
}

fn required<T>(value: Option<T>, op: Operation, column: &str) -> Result<T, RowError> {
    value.ok_or_else(|| RowError::Malformed(format!("{op:?} requires `{column}`")))
}

/// Amounts are read from their text, so `100.500` keeps its scale and is
/// refused by amount validation.
fn required_amount(value: Option<String>, op: Operation) -> Result<Decimal, RowError> {
    let text = required(value, op, "amount")?;
    Decimal::from_str(&text)
        .map_err(|err| RowError::Malformed(format!("Invalid amount `{text}`: {err}")))
}

impl Replay<'_> {
    fn apply(&mut self, row: Row) -> Result<(), RowError> {
        let owner = OwnerId(row.owner);
        match row.op {
            Operation::Open => {
                let mut command = CreateAccountCommand::new(
                    required(row.bank, row.op, "bank")?,
                    required(row.branch, row.op, "branch")?,
                );
                if let (Some(key), Some(kind)) = (row.key, row.key_type) {
                    command = command.with_pix_key(PixKey::new(key, kind));
                }
                if let Some(account_type) = row.account_type {
                    command = command.with_account_type(account_type);
                }
                self.processor.create_account(owner, command)?;
            }
            Operation::Deposit => {
                let account = AccountId(required(row.account, row.op, "account")?);
                let amount = required_amount(row.amount, row.op)?;
                self.processor
                    .deposit(account, owner, amount, row.description)?;
            }
            Operation::Transfer | Operation::Pix => {
                let account = AccountId(required(row.account, row.op, "account")?);
                let amount = required_amount(row.amount, row.op)?;
                let mut request = if row.op == Operation::Transfer {
                    let receiver = required(row.receiver, row.op, "receiver")?;
                    TransferRequest::internal(amount, AccountId(receiver))
                } else {
                    let key = required(row.key, row.op, "key")?;
                    let kind = required(row.key_type, row.op, "key_type")?;
                    TransferRequest::pix(amount, PixKey::new(key, kind))
                };
                if let Some(description) = row.description {
                    request = request.with_description(description);
                }
                request.reference_number = row.reference.clone();
                let tx = self.processor.submit_transfer(account, owner, request)?;
                if let Some(label) = row.reference {
                    self.transfers.insert(label, tx.id);
                }
            }
            Operation::Cancel => {
                let label = required(row.reference, row.op, "ref")?;
                let id = *self
                    .transfers
                    .get(&label)
                    .ok_or_else(|| RowError::Malformed(format!("No transfer labelled `{label}`")))?;
                self.processor.cancel_transfer(id, owner)?;
            }
        }
        Ok(())
    }
}
