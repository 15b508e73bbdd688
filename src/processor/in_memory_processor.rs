use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::MutexGuard;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    account::{Account, AccountError, AccountEvent, AccountEventKind, AccountId, OwnerId},
    clock::{Clock, SystemClock},
    command::{AccountPatch, CreateAccountCommand, TransferRequest, validate_pix_key},
    config::LedgerConfig,
    currency::validate_amount,
    error::{BusinessRuleError, Entity, ErrorKind, ProcessError, ValidationError},
    ledger::{AccountHandle, AccountLedger, Balance},
    store::{Pagination, StoreError, TransactionFilter, TransactionStore},
    transaction::{AppliedLegs, Recipient, Transaction, TransactionStatus, TransactionType},
};

use super::{MonthlySummary, PageRequest, TransactionQuery, TransferProcessor};

const EXECUTION_FAILED_CODE: &str = "EXECUTION_FAILED";

/// Internal cause of a failed execution. Only ever stored on the
/// transaction record and logged.
#[derive(Debug, Error)]
enum ExecutionFault {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Movement<'a> {
    account: &'a mut Account,
    event: AccountEvent,
}

/// Applies movements in order. On a fault the ones already applied are
/// reversed before returning.
fn apply_all(movements: &mut [Movement<'_>]) -> Result<(), AccountError> {
    for idx in 0..movements.len() {
        let movement = &mut movements[idx];
        if let Err(err) = movement.account.apply(&movement.event) {
            revert_all(&mut movements[..idx]);
            return Err(err);
        }
    }
    Ok(())
}

/// Compensating step: undoes applied movements, newest first.
fn revert_all(movements: &mut [Movement<'_>]) {
    for movement in movements.iter_mut().rev() {
        if let Err(err) = movement.account.apply(&movement.event.reversal()) {
            error!(
                account = %movement.account.id(),
                transaction = %movement.event.transaction_id,
                %err,
                "compensating reversal failed"
            );
        }
    }
}

/// Locks the sender and, if given, the receiver, always in ascending id
/// order.
fn lock_pair<'a>(
    sender: (AccountId, &'a AccountHandle),
    receiver: Option<(AccountId, &'a AccountHandle)>,
) -> (MutexGuard<'a, Account>, Option<MutexGuard<'a, Account>>) {
    match receiver {
        Some((receiver_id, receiver)) if receiver_id < sender.0 => {
            debug!(first = %receiver_id, second = %sender.0, "locking accounts");
            let receiver = receiver.lock();
            (sender.1.lock(), Some(receiver))
        }
        Some((receiver_id, receiver)) if receiver_id > sender.0 => {
            debug!(first = %sender.0, second = %receiver_id, "locking accounts");
            let sender = sender.1.lock();
            (sender, Some(receiver.lock()))
        }
        _ => (sender.1.lock(), None),
    }
}

/// Single process ledger: accounts, transactions and the transfer engine
/// that drives them.
pub struct InMemoryTransferProcessor {
    config: Arc<LedgerConfig>,
    ledger: AccountLedger,
    store: TransactionStore,
    clock: Arc<dyn Clock>,
}

impl InMemoryTransferProcessor {
    pub fn new(config: Arc<LedgerConfig>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Arc<LedgerConfig>, clock: Arc<dyn Clock>) -> Self {
        let ledger = AccountLedger::new(config.clone());
        Self::with_ledger(config, ledger, clock)
    }

    pub fn with_ledger(config: Arc<LedgerConfig>, ledger: AccountLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            ledger,
            store: TransactionStore::new(),
            clock,
        }
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    fn try_submit(
        &self,
        sender_account_id: AccountId,
        requester: OwnerId,
        request: &TransferRequest,
    ) -> Result<Transaction, ProcessError> {
        let sender_handle = self
            .ledger
            .handle(sender_account_id)
            .ok_or(ProcessError::NotFound(Entity::Account))?;
        let receiver_handle = request
            .receiver_account_id
            .filter(|id| *id != sender_account_id)
            .and_then(|id| self.ledger.handle(id).map(|handle| (id, handle)));

        // Everything below runs with both accounts locked, so the checks
        // and the mutation they gate see the same state.
        let (mut sender, mut receiver) = lock_pair(
            (sender_account_id, &sender_handle),
            receiver_handle.as_ref().map(|(id, handle)| (*id, handle)),
        );

        if !sender.is_owned_by(requester) {
            return Err(ProcessError::NotFound(Entity::Account));
        }
        if !sender.can_send() {
            return Err(BusinessRuleError::AccountUnavailable.into());
        }

        request.validate_amount()?;

        let transaction_id = Uuid::new_v4();
        let debit = sender.handle_outgoing_transfer(transaction_id, request.amount)?;

        let now = self.clock.now();
        let limit = sender.daily_limit();
        let attempted = self
            .store
            .completed_outgoing_total(sender_account_id, now.date_naive())
            .and_then(|sent| sent.checked_add(request.amount));
        debug!(account = %sender_account_id, ?attempted, %limit, "daily limit check");
        match attempted {
            Some(attempted) if attempted <= limit => {}
            _ => {
                return Err(BusinessRuleError::DailyLimitExceeded {
                    limit,
                    attempted: attempted.unwrap_or(Decimal::MAX),
                }
                .into());
            }
        }

        request.validate_kind()?;
        let recipient = request.recipient()?;
        let currency = request.currency_or(&self.config.currency)?;

        let receiver_id = match &recipient {
            Recipient::Internal { account_id } => {
                if *account_id == sender_account_id {
                    return Err(ValidationError::SameAccount.into());
                }
                let receiver = receiver.as_ref().ok_or(ProcessError::ReceiverNotFound)?;
                if !receiver.is_active() {
                    return Err(BusinessRuleError::ReceiverInactive.into());
                }
                Some(receiver.owner_id())
            }
            Recipient::PixKey { .. } => {
                if let Some(key) = &request.pix_key {
                    validate_pix_key(key)?;
                }
                None
            }
            Recipient::External(_) => None,
        };

        let mut tx = Transaction::pending(
            transaction_id,
            request.kind,
            request.amount,
            currency,
            recipient,
            now,
        );
        tx.reference_number = request.reference_number.clone();
        tx.description = request.description.clone();
        tx.sender_id = Some(requester);
        tx.receiver_id = receiver_id;
        tx.sender_account_id = Some(sender_account_id);
        tx.risk_score = Some(self.config.baseline_risk_score);
        tx.compliance_check = true;
        tx.anti_fraud_check = true;

        let credit = AccountEvent::credit(transaction_id, request.amount);
        let mut movements = vec![Movement {
            account: &mut sender,
            event: debit,
        }];
        if let Some(receiver) = receiver.as_deref_mut() {
            movements.push(Movement {
                account: receiver,
                event: credit,
            });
        }

        let tx = self.admit(tx)?;
        let result = self.execute(tx.id, &mut movements, now);
        self.conclude(tx.id, result, now)
    }

    /// Records a new transaction and moves it to [`TransactionStatus::Processing`].
    fn admit(&self, tx: Transaction) -> Result<Transaction, ProcessError> {
        let id = tx.id;
        let fail = |fault: StoreError| {
            error!(transaction = %id, %fault, "transaction could not be admitted");
            ProcessError::ExecutionFailed { transaction_id: id }
        };
        self.store.create(tx).map_err(fail)?;
        self.store
            .update_status(id, TransactionStatus::Processing, |_| {})
            .map_err(|fault| {
                self.mark_failed(id, &ExecutionFault::Store(fault.clone()), self.clock.now());
                fail(fault)
            })
    }

    /// The atomic step. Either every movement is applied and recorded, or
    /// none is left applied.
    ///
    /// Settles to [`TransactionStatus::Completed`] when funds reached an
    /// internal account; transfers leaving the ledger stay `Processing`.
    fn execute(
        &self,
        transaction_id: Uuid,
        movements: &mut [Movement<'_>],
        now: DateTime<Utc>,
    ) -> Result<Transaction, ExecutionFault> {
        apply_all(movements)?;

        let legs = AppliedLegs {
            sender_debited: movements
                .iter()
                .any(|m| m.event.kind == AccountEventKind::Debited),
            receiver_credited: movements
                .iter()
                .any(|m| m.event.kind == AccountEventKind::Credited),
        };
        let settled = legs.receiver_credited;
        let stamp = move |tx: &mut Transaction| {
            tx.legs = legs;
            tx.processed_at = Some(now);
            if settled {
                tx.completed_at = Some(now);
            }
        };

        let recorded = if settled {
            self.store
                .update_status(transaction_id, TransactionStatus::Completed, stamp)
        } else {
            self.store.update(transaction_id, stamp)
        };
        recorded.map_err(|fault| {
            revert_all(movements);
            fault.into()
        })
    }

    fn conclude(
        &self,
        transaction_id: Uuid,
        result: Result<Transaction, ExecutionFault>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, ProcessError> {
        match result {
            Ok(tx) => {
                info!(
                    transaction = %tx.id,
                    status = %tx.status,
                    amount = %tx.amount,
                    "transaction processed"
                );
                Ok(tx)
            }
            Err(fault) => {
                error!(transaction = %transaction_id, %fault, "transaction execution failed");
                self.mark_failed(transaction_id, &fault, now);
                Err(ProcessError::ExecutionFailed { transaction_id })
            }
        }
    }

    fn mark_failed(&self, transaction_id: Uuid, fault: &ExecutionFault, now: DateTime<Utc>) {
        let marked = self
            .store
            .update_status(transaction_id, TransactionStatus::Failed, |tx| {
                tx.legs = AppliedLegs::default();
                tx.processed_at = Some(now);
                tx.error_code = Some(EXECUTION_FAILED_CODE.to_string());
                tx.error_message = Some(fault.to_string());
            });
        if let Err(err) = marked {
            error!(transaction = %transaction_id, %err, "could not mark transaction as failed");
        }
    }

    fn try_cancel(&self, transaction_id: Uuid, requester: OwnerId) -> Result<(), ProcessError> {
        let not_found = ProcessError::NotFound(Entity::Transaction);
        let snapshot = self
            .store
            .find(transaction_id)
            .filter(|tx| tx.sender_id == Some(requester))
            .ok_or(not_found.clone())?;
        let sender_account_id = snapshot.sender_account_id.ok_or(not_found.clone())?;
        let sender_handle = self
            .ledger
            .handle(sender_account_id)
            .ok_or(not_found.clone())?;
        let receiver_handle = snapshot
            .receiver_account_id()
            .filter(|id| *id != sender_account_id)
            .and_then(|id| self.ledger.handle(id).map(|handle| (id, handle)));

        let (mut sender, mut receiver) = lock_pair(
            (sender_account_id, &sender_handle),
            receiver_handle.as_ref().map(|(id, handle)| (*id, handle)),
        );

        // re-read under the account locks, the status may have moved on
        let tx = self.store.find(transaction_id).ok_or(not_found)?;
        if !tx.status.is_cancellable() {
            return Err(ProcessError::InvalidStateTransition { status: tx.status });
        }

        let mut movements = Vec::with_capacity(2);
        if tx.legs.receiver_credited {
            match receiver.as_deref_mut() {
                Some(account) => movements.push(Movement {
                    account,
                    event: AccountEvent::debit(tx.id, tx.amount),
                }),
                None => warn!(transaction = %tx.id, "credited receiver account is gone"),
            }
        }
        if tx.legs.sender_debited {
            movements.push(Movement {
                account: &mut sender,
                event: AccountEvent::credit(tx.id, tx.amount),
            });
        }

        let reversed = apply_all(&mut movements)
            .map_err(ExecutionFault::from)
            .and_then(|()| {
                self.store
                    .update_status(tx.id, TransactionStatus::Cancelled, |tx| {
                        tx.legs = AppliedLegs::default();
                    })
                    .map_err(|fault| {
                        revert_all(&mut movements);
                        ExecutionFault::from(fault)
                    })
            });

        match reversed {
            Ok(_) => {
                info!(transaction = %tx.id, previous = %tx.status, "transaction cancelled");
                Ok(())
            }
            Err(fault) => {
                error!(transaction = %tx.id, %fault, "cancellation failed");
                Err(ProcessError::ExecutionFailed {
                    transaction_id: tx.id,
                })
            }
        }
    }
}

fn log_rejection(action: &'static str, result: &Result<impl Sized, ProcessError>) {
    if let Err(err) = result
        && err.kind() != ErrorKind::Execution
    {
        warn!(action, reason = %err, "request rejected");
    }
}

impl TransferProcessor for InMemoryTransferProcessor {
    fn create_account(
        &self,
        owner: OwnerId,
        command: CreateAccountCommand,
    ) -> Result<Account, ProcessError> {
        let result = self.ledger.create_account(owner, command, self.clock.now());
        log_rejection("create_account", &result);
        result
    }

    fn update_account(
        &self,
        account_id: AccountId,
        owner: OwnerId,
        patch: AccountPatch,
    ) -> Result<Account, ProcessError> {
        let result = self
            .ledger
            .update_account(account_id, owner, patch, self.clock.now());
        log_rejection("update_account", &result);
        result
    }

    fn get_account(&self, account_id: AccountId, owner: OwnerId) -> Result<Account, ProcessError> {
        self.ledger.get_account(account_id, owner)
    }

    fn get_balance(&self, account_id: AccountId, owner: OwnerId) -> Result<Balance, ProcessError> {
        self.ledger.get_balance(account_id, owner)
    }

    fn list_accounts(&self, owner: OwnerId) -> Vec<Account> {
        self.ledger.list_accounts(owner)
    }

    fn deposit(
        &self,
        account_id: AccountId,
        owner: OwnerId,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Transaction, ProcessError> {
        let handle = self
            .ledger
            .handle(account_id)
            .ok_or(ProcessError::NotFound(Entity::Account))?;
        let mut account = handle.lock();
        if !account.is_owned_by(owner) {
            return Err(ProcessError::NotFound(Entity::Account));
        }
        if !validate_amount(amount) {
            return Err(ValidationError::InvalidAmount { amount }.into());
        }

        let transaction_id = Uuid::new_v4();
        let credit = account.handle_deposit(transaction_id, amount)?;
        let now = self.clock.now();
        let mut tx = Transaction::pending(
            transaction_id,
            TransactionType::Deposit,
            amount,
            self.config.currency.clone(),
            Recipient::Internal { account_id },
            now,
        );
        tx.description = description;
        tx.receiver_id = Some(owner);

        let tx = self.admit(tx)?;
        let mut movements = [Movement {
            account: &mut account,
            event: credit,
        }];
        let result = self.execute(tx.id, &mut movements, now);
        self.conclude(tx.id, result, now)
    }

    fn submit_transfer(
        &self,
        sender_account_id: AccountId,
        requester: OwnerId,
        request: TransferRequest,
    ) -> Result<Transaction, ProcessError> {
        let result = self.try_submit(sender_account_id, requester, &request);
        log_rejection("submit_transfer", &result);
        result
    }

    fn get_transfer(
        &self,
        transaction_id: Uuid,
        requester: OwnerId,
    ) -> Result<Transaction, ProcessError> {
        self.store
            .find(transaction_id)
            .filter(|tx| tx.involves(requester))
            .ok_or(ProcessError::NotFound(Entity::Transaction))
    }

    fn cancel_transfer(&self, transaction_id: Uuid, requester: OwnerId) -> Result<(), ProcessError> {
        let result = self.try_cancel(transaction_id, requester);
        log_rejection("cancel_transfer", &result);
        result
    }

    fn list_transactions(
        &self,
        requester: OwnerId,
        query: TransactionQuery,
        page: PageRequest,
    ) -> Vec<Transaction> {
        let filter = TransactionFilter::involving(requester)
            .with_status(query.status)
            .between(query.start_date, query.end_date);
        self.store.query(
            &filter,
            Pagination::new(page.limit, page.offset, &self.config),
        )
    }

    fn list_account_transactions(
        &self,
        account_id: AccountId,
        owner: OwnerId,
        page: PageRequest,
    ) -> Result<Vec<Transaction>, ProcessError> {
        self.ledger.get_account(account_id, owner)?;
        Ok(self.store.query(
            &TransactionFilter::for_account(account_id),
            Pagination::new(page.limit, page.offset, &self.config),
        ))
    }

    fn monthly_summary(
        &self,
        requester: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<MonthlySummary, ProcessError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(ValidationError::InvalidPeriod { year, month }.into());
        }

        let sent = self.store.query(
            &TransactionFilter::sent_by(requester).in_month(year, month),
            Pagination::unbounded(),
        );
        let count_with = |status: TransactionStatus| sent.iter().filter(|tx| tx.status == status).count();

        Ok(MonthlySummary {
            total_transactions: sent.len(),
            total_amount: sent
                .iter()
                .fold(Decimal::ZERO, |total, tx| total.saturating_add(tx.amount)),
            total_fees: sent
                .iter()
                .fold(Decimal::ZERO, |total, tx| total.saturating_add(tx.processing_fee)),
            successful_transactions: count_with(TransactionStatus::Completed),
            failed_transactions: count_with(TransactionStatus::Failed),
        })
    }
}
