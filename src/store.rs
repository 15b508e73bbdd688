use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    account::{AccountId, OwnerId},
    config::LedgerConfig,
    transaction::{Transaction, TransactionStatus},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Transaction {0} already exists")]
    Duplicate(Uuid),
    #[error("Transaction {0} does not exist")]
    Unknown(Uuid),
    #[error("Transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("Transaction {id} is {status} and can no longer change")]
    Terminal { id: Uuid, status: TransactionStatus },
}

/// Selection criteria for [`TransactionStore::query`]. Unset fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub party: Option<OwnerId>,
    pub sender: Option<OwnerId>,
    pub account: Option<AccountId>,
    pub status: Option<TransactionStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub month: Option<(i32, u32)>,
}

impl TransactionFilter {
    /// Transactions where `owner` is sender or receiver.
    pub fn involving(owner: OwnerId) -> Self {
        Self {
            party: Some(owner),
            ..Default::default()
        }
    }

    pub fn sent_by(owner: OwnerId) -> Self {
        Self {
            sender: Some(owner),
            ..Default::default()
        }
    }

    pub fn for_account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: Option<TransactionStatus>) -> Self {
        self.status = status;
        self
    }

    /// Both bounds are inclusive calendar days.
    pub fn between(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn in_month(mut self, year: i32, month: u32) -> Self {
        self.month = Some((year, month));
        self
    }

    fn matches(&self, tx: &Transaction) -> bool {
        let day = tx.created_at.date_naive();
        self.party.is_none_or(|owner| tx.involves(owner))
            && self.sender.is_none_or(|owner| tx.sender_id == Some(owner))
            && self.account.is_none_or(|account| tx.touches_account(account))
            && self.status.is_none_or(|status| tx.status == status)
            && self.start_date.is_none_or(|start| day >= start)
            && self.end_date.is_none_or(|end| day <= end)
            && self
                .month
                .is_none_or(|(year, month)| day.year() == year && day.month() == month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    /// Missing limits fall back to the configured page size; oversized ones
    /// are capped.
    pub fn new(limit: Option<usize>, offset: usize, config: &LedgerConfig) -> Self {
        Self {
            limit: limit
                .unwrap_or(config.default_page_size)
                .min(config.max_page_size),
            offset,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }
}

#[derive(Default)]
struct StoreInner {
    by_id: HashMap<Uuid, Transaction>,
    // insertion order, breaks ties between equal creation timestamps
    order: Vec<Uuid>,
}

/// Append-only transaction records. Nothing is ever deleted.
#[derive(Default)]
pub struct TransactionStore {
    inner: RwLock<StoreInner>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, tx: Transaction) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&tx.id) {
            return Err(StoreError::Duplicate(tx.id));
        }
        inner.order.push(tx.id);
        inner.by_id.insert(tx.id, tx.clone());
        Ok(tx)
    }

    pub fn find(&self, id: Uuid) -> Option<Transaction> {
        self.inner.read().by_id.get(&id).cloned()
    }

    /// Moves `id` to `status`, applying `update` to the record in the same
    /// step. Illegal transitions leave the record untouched.
    pub fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        update: impl FnOnce(&mut Transaction),
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.write();
        let tx = inner.by_id.get_mut(&id).ok_or(StoreError::Unknown(id))?;
        if !tx.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: tx.status,
                to: status,
            });
        }
        update(tx);
        tx.status = status;
        Ok(tx.clone())
    }

    /// Changes fields of a record that has not reached a terminal status,
    /// leaving its status as is.
    pub fn update(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut Transaction),
    ) -> Result<Transaction, StoreError> {
        let mut inner = self.inner.write();
        let tx = inner.by_id.get_mut(&id).ok_or(StoreError::Unknown(id))?;
        if tx.status.is_terminal() {
            return Err(StoreError::Terminal {
                id,
                status: tx.status,
            });
        }
        let status = tx.status;
        update(tx);
        tx.status = status;
        Ok(tx.clone())
    }

    /// Matching records, newest first.
    pub fn query(&self, filter: &TransactionFilter, page: Pagination) -> Vec<Transaction> {
        let inner = self.inner.read();
        let mut matching: Vec<&Transaction> = inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.by_id.get(id))
            .filter(|tx| filter.matches(tx))
            .collect();
        // stable sort keeps later inserts first among equal timestamps
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect()
    }

    /// Sum of completed outgoing amounts from `account` created on `day`.
    /// `None` if the sum does not fit a decimal.
    pub fn completed_outgoing_total(&self, account: AccountId, day: NaiveDate) -> Option<Decimal> {
        let inner = self.inner.read();
        inner
            .by_id
            .values()
            .filter(|tx| {
                tx.sender_account_id == Some(account)
                    && tx.status == TransactionStatus::Completed
                    && tx.created_at.date_naive() == day
            })
            .try_fold(Decimal::ZERO, |total, tx| total.checked_add(tx.amount))
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
