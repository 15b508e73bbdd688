use std::io::Read;

use crate::{account::AccountType, identity::PixKeyType};
use csv::{DeserializeRecordsIntoIter, Trim};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Open,
    Deposit,
    Transfer,
    Pix,
    Cancel,
}

/// One ledger operation. Which columns are required depends on `op`.
#[derive(Debug, Deserialize)]
pub struct Row {
    pub op: Operation,
    pub owner: u64,
    pub account: Option<u64>,
    pub receiver: Option<u64>,
    /// Kept as text so the amount is parsed exactly, scale included.
    pub amount: Option<String>,
    pub key: Option<String>,
    pub key_type: Option<PixKeyType>,
    pub bank: Option<String>,
    pub branch: Option<String>,
    /// Label of a transfer; a `cancel` row names the transfer it undoes.
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub account_type: Option<AccountType>,
    pub description: Option<String>,
}

/// Parses the operation list in CSV format, yielding each row with the
/// line it starts on.
pub struct CsvOperationParser<R> {
    iter: DeserializeRecordsIntoIter<R, Row>,
}

impl<R> CsvOperationParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);

        Self {
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvOperationParser<R>
where
    R: Read,
{
    type Item = (u64, Result<Row, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}
