use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::{AccountId, OwnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    InstantTransfer,
    PixTransfer,
    SepaTransfer,
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionType::InstantTransfer => "instant_transfer",
            TransactionType::PixTransfer => "pix_transfer",
            TransactionType::SepaTransfer => "sepa_transfer",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecipient {
    pub name: String,
    pub bank: String,
    pub account: String,
    pub document: Option<String>,
}

/// Where the funds go. Exactly one mode per transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Recipient {
    Internal { account_id: AccountId },
    PixKey { key: String },
    External(ExternalRecipient),
}

/// Balance movements currently applied on behalf of a transaction.
/// Cancellation reverses exactly these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedLegs {
    pub sender_debited: bool,
    pub receiver_credited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub reference_number: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub sender_id: Option<OwnerId>,
    pub receiver_id: Option<OwnerId>,
    pub sender_account_id: Option<AccountId>,
    pub recipient: Recipient,
    pub processing_fee: Decimal,
    pub exchange_rate: Option<Decimal>,
    pub risk_score: Option<Decimal>,
    pub compliance_check: bool,
    pub anti_fraud_check: bool,
    pub legs: AppliedLegs,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl Transaction {
    /// Fresh record in [`TransactionStatus::Pending`].
    pub fn pending(
        id: Uuid,
        kind: TransactionType,
        amount: Decimal,
        currency: impl Into<String>,
        recipient: Recipient,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            reference_number: None,
            amount,
            currency: currency.into(),
            description: None,
            kind,
            status: TransactionStatus::Pending,
            sender_id: None,
            receiver_id: None,
            sender_account_id: None,
            recipient,
            processing_fee: Decimal::new(0, 2),
            exchange_rate: None,
            risk_score: None,
            compliance_check: false,
            anti_fraud_check: false,
            legs: AppliedLegs::default(),
            created_at,
            processed_at: None,
            completed_at: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn receiver_account_id(&self) -> Option<AccountId> {
        match &self.recipient {
            Recipient::Internal { account_id } => Some(*account_id),
            _ => None,
        }
    }

    pub fn pix_key(&self) -> Option<&str> {
        match &self.recipient {
            Recipient::PixKey { key } => Some(key),
            _ => None,
        }
    }

    pub fn external_recipient(&self) -> Option<&ExternalRecipient> {
        match &self.recipient {
            Recipient::External(external) => Some(external),
            _ => None,
        }
    }

    /// Whether `owner` is on either side of this transaction.
    pub fn involves(&self, owner: OwnerId) -> bool {
        self.sender_id == Some(owner) || self.receiver_id == Some(owner)
    }

    /// Whether `account` is the sender or the internal receiver.
    pub fn touches_account(&self, account: AccountId) -> bool {
        self.sender_account_id == Some(account) || self.receiver_account_id() == Some(account)
    }
}
