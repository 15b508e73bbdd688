use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    account::{Account, AccountId, OwnerId},
    command::{AccountPatch, CreateAccountCommand, TransferRequest},
    error::ProcessError,
    ledger::Balance,
    transaction::{Transaction, TransactionStatus},
};

pub mod in_memory_processor;

/// Listing filters a caller may supply.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub total_transactions: usize,
    pub total_amount: Decimal,
    pub total_fees: Decimal,
    pub successful_transactions: usize,
    pub failed_transactions: usize,
}

/// Operations offered to a request handling layer. Every call is
/// synchronous and safe to issue concurrently.
pub trait TransferProcessor {
    fn create_account(
        &self,
        owner: OwnerId,
        command: CreateAccountCommand,
    ) -> Result<Account, ProcessError>;

    fn update_account(
        &self,
        account_id: AccountId,
        owner: OwnerId,
        patch: AccountPatch,
    ) -> Result<Account, ProcessError>;

    fn get_account(&self, account_id: AccountId, owner: OwnerId) -> Result<Account, ProcessError>;

    fn get_balance(&self, account_id: AccountId, owner: OwnerId) -> Result<Balance, ProcessError>;

    fn list_accounts(&self, owner: OwnerId) -> Vec<Account>;

    fn deposit(
        &self,
        account_id: AccountId,
        owner: OwnerId,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Transaction, ProcessError>;

    fn submit_transfer(
        &self,
        sender_account_id: AccountId,
        requester: OwnerId,
        request: TransferRequest,
    ) -> Result<Transaction, ProcessError>;

    fn get_transfer(&self, transaction_id: Uuid, requester: OwnerId)
    -> Result<Transaction, ProcessError>;

    fn cancel_transfer(&self, transaction_id: Uuid, requester: OwnerId) -> Result<(), ProcessError>;

    fn list_transactions(
        &self,
        requester: OwnerId,
        query: TransactionQuery,
        page: PageRequest,
    ) -> Vec<Transaction>;

    fn list_account_transactions(
        &self,
        account_id: AccountId,
        owner: OwnerId,
        page: PageRequest,
    ) -> Result<Vec<Transaction>, ProcessError>;

    fn monthly_summary(
        &self,
        requester: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary, ProcessError>;
}
