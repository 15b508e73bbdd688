/// Account state. Balances only change by applying events, which are
/// created by handling transfer and deposit requests.
pub mod account;

/// Time source, swappable in tests.
pub mod clock;

/// Account and transfer requests, plus their input validation.
pub mod command;

pub mod config;

/// BRL amount formatting, parsing and validation.
pub mod currency;

pub mod error;

/// CPF/CNPJ check digits, PIX key grammars and bank code formats.
pub mod identity;

/// Account registry with per account locking.
pub mod ledger;

/// Transfer processor interface, plus "in memory" implementation.
/// Coordinates validation, execution and cancellation of transfers.
pub mod processor;

/// Append-only transaction records and their queries.
pub mod store;

pub mod transaction;

/// Batch replay of ledger operations from CSV. Lives here so integration
/// tests can drive it.
pub mod bin_utils;
