use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    account::{Account, AccountId, OwnerId},
    command::{AccountPatch, CreateAccountCommand, validate_pix_key},
    config::LedgerConfig,
    currency::format_brl,
    error::{Entity, ProcessError, ValidationError},
};

pub type AccountHandle = Arc<Mutex<Account>>;

pub type NumberGenerator = Box<dyn FnMut() -> String + Send + Sync>;

fn random_account_number() -> String {
    format!("{:08}", rand::thread_rng().gen_range(0..100_000_000u32))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub formatted: String,
    pub currency: String,
}

struct Registry {
    accounts: HashMap<AccountId, AccountHandle>,
    account_numbers: HashSet<String>,
    pix_keys: HashMap<String, AccountId>,
    next_id: u64,
    generate_number: NumberGenerator,
}

impl Registry {
    fn unique_account_number(&mut self) -> String {
        loop {
            let candidate = (self.generate_number)();
            if !self.account_numbers.contains(&candidate) {
                return candidate;
            }
            debug!(candidate = %candidate, "account number collision, regenerating");
        }
    }

    fn pix_key_taken(&self, key: &str, except: Option<AccountId>) -> bool {
        self.pix_keys
            .get(key)
            .is_some_and(|owner| Some(*owner) != except)
    }
}

/// Arena of accounts keyed by [`AccountId`].
///
/// The registry lock guards membership and the uniqueness indexes; each
/// account has its own mutex for balance changes. Callers must never take
/// the registry lock while holding an account lock.
pub struct AccountLedger {
    config: Arc<LedgerConfig>,
    registry: RwLock<Registry>,
}

impl AccountLedger {
    pub fn new(config: Arc<LedgerConfig>) -> Self {
        Self::with_number_generator(config, Box::new(random_account_number))
    }

    pub fn with_number_generator(config: Arc<LedgerConfig>, generate_number: NumberGenerator) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry {
                accounts: HashMap::new(),
                account_numbers: HashSet::new(),
                pix_keys: HashMap::new(),
                next_id: 1,
                generate_number,
            }),
        }
    }

    /// Not a standards compliant IBAN, the check digits are a fixed
    /// placeholder.
    fn pseudo_iban(&self, bank_code: &str, branch_code: &str, account_number: &str) -> String {
        format!(
            "{}{}{bank_code}{branch_code}{account_number:0>12}",
            self.config.iban_country, self.config.iban_check_digits
        )
    }

    pub fn create_account(
        &self,
        owner: OwnerId,
        command: CreateAccountCommand,
        now: DateTime<Utc>,
    ) -> Result<Account, ProcessError> {
        command.validate()?;

        let mut registry = self.registry.write();
        if let Some(key) = &command.pix_key
            && registry.pix_key_taken(&key.value, None)
        {
            return Err(ValidationError::DuplicatePixKey.into());
        }

        let id = AccountId(registry.next_id);
        let account_number = registry.unique_account_number();
        let account = Account {
            id,
            iban: self.pseudo_iban(&command.bank_code, &command.branch_code, &account_number),
            account_number: account_number.clone(),
            account_type: command.account_type,
            bank_code: command.bank_code,
            branch_code: command.branch_code,
            balance: Decimal::new(0, 2),
            daily_limit: self.config.default_daily_limit,
            monthly_limit: self.config.default_monthly_limit,
            active: true,
            blocked: false,
            pix_key: command.pix_key,
            owner_id: owner,
            created_at: now,
            updated_at: None,
        };

        registry.next_id += 1;
        registry.account_numbers.insert(account_number);
        if let Some(key) = &account.pix_key {
            registry.pix_keys.insert(key.value.clone(), id);
        }
        registry
            .accounts
            .insert(id, Arc::new(Mutex::new(account.clone())));

        info!(account = %id, owner = %owner, number = %account.account_number, "account created");
        Ok(account)
    }

    pub fn update_account(
        &self,
        id: AccountId,
        owner: OwnerId,
        patch: AccountPatch,
        now: DateTime<Utc>,
    ) -> Result<Account, ProcessError> {
        let mut registry = self.registry.write();
        let handle = registry
            .accounts
            .get(&id)
            .cloned()
            .ok_or(ProcessError::NotFound(Entity::Account))?;
        let mut account = handle.lock();
        if !account.is_owned_by(owner) {
            return Err(ProcessError::NotFound(Entity::Account));
        }

        if let Some(key) = &patch.pix_key {
            validate_pix_key(key)?;
            if registry.pix_key_taken(&key.value, Some(id)) {
                return Err(ValidationError::DuplicatePixKey.into());
            }
        }

        if let Some(key) = patch.pix_key {
            if let Some(previous) = account.pix_key.take() {
                registry.pix_keys.remove(&previous.value);
            }
            registry.pix_keys.insert(key.value.clone(), id);
            account.pix_key = Some(key);
        }
        if let Some(limit) = patch.daily_limit {
            account.daily_limit = limit;
        }
        if let Some(limit) = patch.monthly_limit {
            account.monthly_limit = limit;
        }
        if let Some(active) = patch.active {
            account.active = active;
        }
        account.updated_at = Some(now);

        info!(account = %id, "account updated");
        Ok(account.clone())
    }

    /// Raw handle for engine use. Ownership is not checked.
    pub fn handle(&self, id: AccountId) -> Option<AccountHandle> {
        self.registry.read().accounts.get(&id).cloned()
    }

    /// Owned account snapshot; absent and foreign accounts look the same.
    pub fn get_account(&self, id: AccountId, owner: OwnerId) -> Result<Account, ProcessError> {
        let handle = self
            .handle(id)
            .ok_or(ProcessError::NotFound(Entity::Account))?;
        let account = handle.lock();
        if account.is_owned_by(owner) {
            Ok(account.clone())
        } else {
            Err(ProcessError::NotFound(Entity::Account))
        }
    }

    pub fn get_balance(&self, id: AccountId, owner: OwnerId) -> Result<Balance, ProcessError> {
        let account = self.get_account(id, owner)?;
        Ok(Balance {
            account_id: id,
            amount: account.balance,
            formatted: format_brl(account.balance),
            currency: self.config.currency.clone(),
        })
    }

    pub fn list_accounts(&self, owner: OwnerId) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .all_accounts()
            .into_iter()
            .filter(|account| account.is_owned_by(owner))
            .collect();
        accounts.sort_by_key(Account::id);
        accounts
    }

    /// Snapshot of every account, in id order.
    pub fn all_accounts(&self) -> Vec<Account> {
        let handles: Vec<AccountHandle> = self.registry.read().accounts.values().cloned().collect();
        let mut accounts: Vec<Account> = handles.iter().map(|handle| handle.lock().clone()).collect();
        accounts.sort_by_key(Account::id);
        accounts
    }

    /// Administrative block flag; blocked accounts cannot send.
    pub fn set_blocked(&self, id: AccountId, blocked: bool) -> Result<(), ProcessError> {
        let handle = self
            .handle(id)
            .ok_or(ProcessError::NotFound(Entity::Account))?;
        handle.lock().blocked = blocked;
        info!(account = %id, blocked, "account block flag changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use crate::identity::{PixKey, PixKeyType};

    use super::*;

    fn ledger() -> AccountLedger {
        AccountLedger::new(Arc::new(LedgerConfig::default()))
    }

    fn open(ledger: &AccountLedger, owner: u64) -> Account {
        ledger
            .create_account(OwnerId(owner), CreateAccountCommand::new("001", "1234"), Utc::now())
            .unwrap()
    }

    #[test]
    fn new_account_defaults() {
        let ledger = ledger();
        let acc = open(&ledger, 7);
        assert_eq!(acc.id(), AccountId(1));
        assert_eq!(acc.account_number().len(), 8);
        assert!(acc.account_number().chars().all(|c| c.is_ascii_digit()));
        assert_eq!(acc.balance().to_string(), "0.00");
        assert_eq!(acc.daily_limit().to_string(), "10000.00");
        assert_eq!(acc.monthly_limit().to_string(), "100000.00");
        assert!(acc.is_active());
        assert!(!acc.is_blocked());
        assert_eq!(
            acc.iban(),
            format!("BR0000112340000{}", acc.account_number())
        );
        assert_eq!(acc.iban().len(), 2 + 2 + 3 + 4 + 12);
    }

    #[test]
    fn account_numbers_are_regenerated_on_collision() {
        let numbers = Mutex::new(VecDeque::from(vec![
            "00000001".to_string(),
            "00000001".to_string(),
            "00000001".to_string(),
            "00000002".to_string(),
        ]));
        let ledger = AccountLedger::with_number_generator(
            Arc::new(LedgerConfig::default()),
            Box::new(move || numbers.lock().pop_front().unwrap()),
        );
        assert_eq!(open(&ledger, 1).account_number(), "00000001");
        assert_eq!(open(&ledger, 1).account_number(), "00000002");
    }

    #[test]
    fn pix_keys_are_unique() {
        let ledger = ledger();
        let key = PixKey::new("test@example.com", PixKeyType::Email);
        let first = ledger
            .create_account(
                OwnerId(1),
                CreateAccountCommand::new("001", "0001").with_pix_key(key.clone()),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(first.pix_key(), Some(&key));

        let err = ledger
            .create_account(
                OwnerId(2),
                CreateAccountCommand::new("001", "0001").with_pix_key(key.clone()),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, ProcessError::Validation(ValidationError::DuplicatePixKey));

        // re-registering on the same account is fine
        let patch = AccountPatch {
            pix_key: Some(key.clone()),
            ..Default::default()
        };
        assert!(ledger
            .update_account(first.id(), OwnerId(1), patch, Utc::now())
            .is_ok());

        let second = open(&ledger, 2);
        let patch = AccountPatch {
            pix_key: Some(key),
            ..Default::default()
        };
        let err = ledger
            .update_account(second.id(), OwnerId(2), patch, Utc::now())
            .unwrap_err();
        assert_eq!(err, ProcessError::Validation(ValidationError::DuplicatePixKey));
    }

    #[test]
    fn replaced_pix_key_is_released() {
        let ledger = ledger();
        let old = PixKey::new("+5511999999999", PixKeyType::Phone);
        let acc = ledger
            .create_account(
                OwnerId(1),
                CreateAccountCommand::new("001", "0001").with_pix_key(old.clone()),
                Utc::now(),
            )
            .unwrap();
        let patch = AccountPatch {
            pix_key: Some(PixKey::new("11144477735", PixKeyType::Cpf)),
            ..Default::default()
        };
        ledger
            .update_account(acc.id(), OwnerId(1), patch, Utc::now())
            .unwrap();

        let other = ledger.create_account(
            OwnerId(2),
            CreateAccountCommand::new("001", "0001").with_pix_key(old),
            Utc::now(),
        );
        assert!(other.is_ok());
    }

    #[test]
    fn partial_update() {
        let ledger = ledger();
        let acc = open(&ledger, 1);
        let patch = AccountPatch {
            daily_limit: Some(Decimal::new(500_00, 2)),
            active: Some(false),
            ..Default::default()
        };
        let updated = ledger
            .update_account(acc.id(), OwnerId(1), patch, Utc::now())
            .unwrap();
        assert_eq!(updated.daily_limit(), Decimal::new(500_00, 2));
        assert_eq!(updated.monthly_limit(), acc.monthly_limit());
        assert!(!updated.is_active());
        assert!(updated.updated_at().is_some());

        let invalid = AccountPatch {
            pix_key: Some(PixKey::new("not-a-phone", PixKeyType::Phone)),
            monthly_limit: Some(Decimal::ONE),
            ..Default::default()
        };
        let err = ledger
            .update_account(acc.id(), OwnerId(1), invalid, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Validation(ValidationError::InvalidPixKey { .. })
        ));
        // rejected patches change nothing
        let current = ledger.get_account(acc.id(), OwnerId(1)).unwrap();
        assert_eq!(current.monthly_limit(), acc.monthly_limit());
    }

    #[test]
    fn foreign_and_missing_accounts_look_alike() {
        let ledger = ledger();
        let acc = open(&ledger, 1);
        let foreign = ledger.get_balance(acc.id(), OwnerId(2)).unwrap_err();
        let missing = ledger.get_balance(AccountId(99), OwnerId(1)).unwrap_err();
        assert_eq!(foreign, missing);
        assert_eq!(foreign, ProcessError::NotFound(Entity::Account));

        let err = ledger
            .update_account(acc.id(), OwnerId(2), AccountPatch::default(), Utc::now())
            .unwrap_err();
        assert_eq!(err, ProcessError::NotFound(Entity::Account));
    }

    #[test]
    fn balance_and_listing() {
        let ledger = ledger();
        let a = open(&ledger, 1);
        open(&ledger, 2);
        let c = open(&ledger, 1);

        let balance = ledger.get_balance(a.id(), OwnerId(1)).unwrap();
        assert_eq!(balance.formatted, "R$ 0,00");
        assert_eq!(balance.currency, "BRL");

        let ids: Vec<AccountId> = ledger.list_accounts(OwnerId(1)).iter().map(Account::id).collect();
        assert_eq!(ids, vec![a.id(), c.id()]);
        assert_eq!(ledger.all_accounts().len(), 3);
    }

    #[test]
    fn malformed_codes_are_rejected() {
        let ledger = ledger();
        let err = ledger
            .create_account(OwnerId(1), CreateAccountCommand::new("1", "0001"), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Validation(ValidationError::InvalidBankCode { .. })
        ));
        assert!(ledger.all_accounts().is_empty());
    }
}
