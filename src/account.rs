use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{currency::MAX_SCALE, error::BusinessRuleError, identity::PixKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an identity managed outside the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Checking,
    Savings,
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            other => Err(format!("Unknown account type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEventKind {
    Debited,
    Credited,
}

/// A single balance movement on behalf of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEvent {
    pub transaction_id: Uuid,
    pub amount: Decimal,
    pub kind: AccountEventKind,
}

impl AccountEvent {
    pub fn debit(transaction_id: Uuid, amount: Decimal) -> Self {
        Self {
            transaction_id,
            amount,
            kind: AccountEventKind::Debited,
        }
    }

    pub fn credit(transaction_id: Uuid, amount: Decimal) -> Self {
        Self {
            transaction_id,
            amount,
            kind: AccountEventKind::Credited,
        }
    }

    /// The movement that undoes this one.
    pub fn reversal(&self) -> Self {
        Self {
            transaction_id: self.transaction_id,
            amount: self.amount,
            kind: match self.kind {
                AccountEventKind::Debited => AccountEventKind::Credited,
                AccountEventKind::Credited => AccountEventKind::Debited,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Balance of account {account} overflows when applying {kind:?} of {amount}")]
    Overflow {
        account: AccountId,
        kind: AccountEventKind,
        amount: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub(crate) id: AccountId,
    pub(crate) account_number: String,
    pub(crate) account_type: AccountType,
    pub(crate) bank_code: String,
    pub(crate) branch_code: String,
    pub(crate) balance: Decimal,
    pub(crate) daily_limit: Decimal,
    pub(crate) monthly_limit: Decimal,
    pub(crate) active: bool,
    pub(crate) blocked: bool,
    pub(crate) pix_key: Option<PixKey>,
    pub(crate) iban: String,
    pub(crate) owner_id: OwnerId,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn bank_code(&self) -> &str {
        &self.bank_code
    }

    pub fn branch_code(&self) -> &str {
        &self.branch_code
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn daily_limit(&self) -> Decimal {
        self.daily_limit
    }

    pub fn monthly_limit(&self) -> Decimal {
        self.monthly_limit
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn pix_key(&self) -> Option<&PixKey> {
        self.pix_key.as_ref()
    }

    pub fn iban(&self) -> &str {
        &self.iban
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_owned_by(&self, owner: OwnerId) -> bool {
        self.owner_id == owner
    }

    /// Active and not blocked, i.e. allowed to send funds.
    pub fn can_send(&self) -> bool {
        self.active && !self.blocked
    }

    /// Applies a balance movement, keeping the balance at two fraction
    /// digits. The balance is left untouched on error.
    ///
    /// Non-negativity is not enforced here; it is a transfer admission rule.
    pub fn apply(&mut self, event: &AccountEvent) -> Result<(), AccountError> {
        let next = match event.kind {
            AccountEventKind::Credited => self.balance.checked_add(event.amount),
            AccountEventKind::Debited => self.balance.checked_sub(event.amount),
        };
        let mut next = next.ok_or(AccountError::Overflow {
            account: self.id,
            kind: event.kind,
            amount: event.amount,
        })?;
        next.rescale(MAX_SCALE);
        self.balance = next;
        Ok(())
    }

    /// Checks that this account may send `amount` and builds the debit.
    pub fn handle_outgoing_transfer(
        &self,
        transaction_id: Uuid,
        amount: Decimal,
    ) -> Result<AccountEvent, BusinessRuleError> {
        if !self.can_send() {
            return Err(BusinessRuleError::AccountUnavailable);
        }
        if self.balance < amount {
            return Err(BusinessRuleError::InsufficientBalance);
        }
        Ok(AccountEvent::debit(transaction_id, amount))
    }

    pub fn handle_deposit(
        &self,
        transaction_id: Uuid,
        amount: Decimal,
    ) -> Result<AccountEvent, BusinessRuleError> {
        if !self.can_send() {
            return Err(BusinessRuleError::AccountUnavailable);
        }
        Ok(AccountEvent::credit(transaction_id, amount))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rust_decimal::prelude::FromPrimitive;

    use super::*;

    pub(crate) fn account(id: u64, owner: u64, balance: u32) -> Account {
        Account {
            id: AccountId(id),
            account_number: format!("{id:08}"),
            account_type: AccountType::Checking,
            bank_code: "001".to_string(),
            branch_code: "0001".to_string(),
            balance: Decimal::from_u32(balance).unwrap(),
            daily_limit: Decimal::new(10_000_00, 2),
            monthly_limit: Decimal::new(100_000_00, 2),
            active: true,
            blocked: false,
            pix_key: None,
            iban: String::new(),
            owner_id: OwnerId(owner),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn apply_events() {
        let mut acc = account(1, 1, 0);
        let tx = Uuid::new_v4();
        acc.apply(&AccountEvent::credit(tx, Decimal::from_u32(10).unwrap()))
            .unwrap();
        assert_eq!(acc.balance(), Decimal::from_u32(10).unwrap());

        let debit = AccountEvent::debit(tx, Decimal::from_u32(3).unwrap());
        acc.apply(&debit).unwrap();
        assert_eq!(acc.balance(), Decimal::from_u32(7).unwrap());

        acc.apply(&debit.reversal()).unwrap();
        assert_eq!(acc.balance(), Decimal::from_u32(10).unwrap());

        // events are the source of truth, balance may go negative
        acc.apply(&AccountEvent::debit(tx, Decimal::from_u32(15).unwrap()))
            .unwrap();
        assert_eq!(acc.balance(), Decimal::from_i32(-5).unwrap());
    }

    #[test]
    fn balance_keeps_two_fraction_digits() {
        let mut acc = account(3, 1, 0);
        acc.balance = Decimal::new(0, 2);
        let tx = Uuid::new_v4();
        acc.apply(&AccountEvent::credit(tx, Decimal::from_u32(1000).unwrap()))
            .unwrap();
        assert_eq!(acc.balance().scale(), 2);
        assert_eq!(acc.balance().to_string(), "1000.00");

        acc.apply(&AccountEvent::debit(tx, Decimal::new(25, 1)))
            .unwrap();
        assert_eq!(acc.balance().to_string(), "997.50");
    }

    #[test]
    fn overflow_leaves_balance_untouched() {
        let mut acc = account(2, 1, 0);
        acc.balance = Decimal::MAX;
        let err = acc
            .apply(&AccountEvent::credit(Uuid::new_v4(), Decimal::ONE))
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::Overflow {
                account: AccountId(2),
                kind: AccountEventKind::Credited,
                ..
            }
        ));
        assert_eq!(acc.balance(), Decimal::MAX);
    }

    #[test]
    fn handle_outgoing_transfer() {
        let mut acc = account(1, 1, 100);
        let tx = Uuid::new_v4();

        let evt = acc
            .handle_outgoing_transfer(tx, Decimal::from_u32(100).unwrap())
            .unwrap();
        assert_eq!(evt.kind, AccountEventKind::Debited);
        assert_eq!(evt.amount, Decimal::from_u32(100).unwrap());

        let err = acc
            .handle_outgoing_transfer(tx, Decimal::new(100_01, 2))
            .unwrap_err();
        assert_eq!(err, BusinessRuleError::InsufficientBalance);

        acc.blocked = true;
        let err = acc.handle_outgoing_transfer(tx, Decimal::ONE).unwrap_err();
        assert_eq!(err, BusinessRuleError::AccountUnavailable);

        acc.blocked = false;
        acc.active = false;
        let err = acc.handle_deposit(tx, Decimal::ONE).unwrap_err();
        assert_eq!(err, BusinessRuleError::AccountUnavailable);
    }

    #[test]
    fn account_type_text() {
        assert_eq!("savings".parse::<AccountType>(), Ok(AccountType::Savings));
        assert!("premium".parse::<AccountType>().is_err());
    }
}
