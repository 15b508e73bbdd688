use std::fmt;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{identity::PixKeyType, transaction::TransactionStatus, transaction::TransactionType};

/// Malformed input. Always recoverable by the caller fixing the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Amount must be positive with at most 2 decimal places, got {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("Exactly one of receiver account, PIX key or external recipient must be provided")]
    MissingRecipientInfo,
    #[error("Invalid PIX key for type {kind}")]
    InvalidPixKey { kind: PixKeyType },
    #[error("PIX key already registered")]
    DuplicatePixKey,
    #[error("Bank code must be 3 digits, got `{code}`")]
    InvalidBankCode { code: String },
    #[error("Branch code must be 4 digits, got `{code}`")]
    InvalidBranchCode { code: String },
    #[error("Currency must be a 3 letter code, got `{code}`")]
    InvalidCurrency { code: String },
    #[error("Sender and receiver accounts must differ")]
    SameAccount,
    #[error("{kind} cannot be submitted as a transfer")]
    UnsupportedTransactionType { kind: TransactionType },
    #[error("Invalid period {year}-{month}")]
    InvalidPeriod { year: i32, month: u32 },
}

/// The request is well formed but the ledger state does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessRuleError {
    #[error("Sender account is not available for transfers")]
    AccountUnavailable,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Daily transfer limit of {limit} exceeded, {attempted} would be transferred today")]
    DailyLimitExceeded { limit: Decimal, attempted: Decimal },
    #[error("Receiver account is not active")]
    ReceiverInactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Account,
    Transaction,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Account => f.write_str("Account"),
            Entity::Transaction => f.write_str("Transaction"),
        }
    }
}

/// Coarse classification of [`ProcessError`], for callers mapping errors
/// onto their own transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    BusinessRule,
    State,
    Execution,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    BusinessRule(#[from] BusinessRuleError),
    /// Absent and not-owned entities are indistinguishable.
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("Receiver account not found")]
    ReceiverNotFound,
    #[error("Cannot cancel a {status} transaction")]
    InvalidStateTransition { status: TransactionStatus },
    /// Cause is recorded on the transaction itself.
    #[error("Transfer processing failed")]
    ExecutionFailed { transaction_id: Uuid },
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Validation(_) => ErrorKind::Validation,
            ProcessError::BusinessRule(_) => ErrorKind::BusinessRule,
            ProcessError::NotFound(_) | ProcessError::ReceiverNotFound => ErrorKind::NotFound,
            ProcessError::InvalidStateTransition { .. } => ErrorKind::State,
            ProcessError::ExecutionFailed { .. } => ErrorKind::Execution,
        }
    }
}
