use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    account::{AccountId, AccountType},
    currency::validate_amount,
    error::ValidationError,
    identity::{PixKey, validate_bank_code, validate_branch_code},
    transaction::{ExternalRecipient, Recipient, TransactionType},
};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccountCommand {
    #[serde(default)]
    pub account_type: AccountType,
    pub bank_code: String,
    pub branch_code: String,
    pub pix_key: Option<PixKey>,
}

impl CreateAccountCommand {
    pub fn new(bank_code: impl Into<String>, branch_code: impl Into<String>) -> Self {
        Self {
            account_type: AccountType::default(),
            bank_code: bank_code.into(),
            branch_code: branch_code.into(),
            pix_key: None,
        }
    }

    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = account_type;
        self
    }

    pub fn with_pix_key(mut self, pix_key: PixKey) -> Self {
        self.pix_key = Some(pix_key);
        self
    }

    /// Shape checks only; key uniqueness needs the registry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !validate_bank_code(&self.bank_code) {
            return Err(ValidationError::InvalidBankCode {
                code: self.bank_code.clone(),
            });
        }
        if !validate_branch_code(&self.branch_code) {
            return Err(ValidationError::InvalidBranchCode {
                code: self.branch_code.clone(),
            });
        }
        if let Some(key) = &self.pix_key {
            validate_pix_key(key)?;
        }
        Ok(())
    }
}

/// Partial account update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    pub pix_key: Option<PixKey>,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    pub active: Option<bool>,
}

pub(crate) fn validate_pix_key(key: &PixKey) -> Result<(), ValidationError> {
    if key.is_valid() {
        Ok(())
    } else {
        Err(ValidationError::InvalidPixKey { kind: key.kind })
    }
}

/// Raw external recipient fields as a caller supplies them. Only the triple
/// of name, bank and account selects the external mode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalRecipientFields {
    pub name: Option<String>,
    pub bank: Option<String>,
    pub account: Option<String>,
    pub document: Option<String>,
}

impl ExternalRecipientFields {
    fn is_empty(&self) -> bool {
        [&self.name, &self.bank, &self.account]
            .iter()
            .all(|field| field.as_deref().is_none_or(str::is_empty))
    }

    fn complete(&self) -> Option<ExternalRecipient> {
        let present = |field: &Option<String>| field.clone().filter(|v| !v.is_empty());
        Some(ExternalRecipient {
            name: present(&self.name)?,
            bank: present(&self.bank)?,
            account: present(&self.account)?,
            document: self.document.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub kind: TransactionType,
    pub reference_number: Option<String>,
    pub receiver_account_id: Option<AccountId>,
    pub pix_key: Option<PixKey>,
    #[serde(default)]
    pub external: ExternalRecipientFields,
}

impl TransferRequest {
    fn base(amount: Decimal, kind: TransactionType) -> Self {
        Self {
            amount,
            currency: None,
            description: None,
            kind,
            reference_number: None,
            receiver_account_id: None,
            pix_key: None,
            external: ExternalRecipientFields::default(),
        }
    }

    pub fn internal(amount: Decimal, receiver: AccountId) -> Self {
        Self {
            receiver_account_id: Some(receiver),
            ..Self::base(amount, TransactionType::InstantTransfer)
        }
    }

    pub fn pix(amount: Decimal, key: PixKey) -> Self {
        Self {
            pix_key: Some(key),
            ..Self::base(amount, TransactionType::PixTransfer)
        }
    }

    pub fn external(amount: Decimal, recipient: ExternalRecipient) -> Self {
        Self {
            external: ExternalRecipientFields {
                name: Some(recipient.name),
                bank: Some(recipient.bank),
                account: Some(recipient.account),
                document: recipient.document,
            },
            ..Self::base(amount, TransactionType::InstantTransfer)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_kind(mut self, kind: TransactionType) -> Self {
        self.kind = kind;
        self
    }

    pub fn validate_amount(&self) -> Result<(), ValidationError> {
        if validate_amount(self.amount) {
            Ok(())
        } else {
            Err(ValidationError::InvalidAmount {
                amount: self.amount,
            })
        }
    }

    /// Resolves the single recipient mode. Supplying none, more than one,
    /// or an incomplete external triple is rejected.
    pub fn recipient(&self) -> Result<Recipient, ValidationError> {
        let has_external = !self.external.is_empty();
        let modes = [
            self.receiver_account_id.is_some(),
            self.pix_key.is_some(),
            has_external,
        ];
        if modes.iter().filter(|m| **m).count() != 1 {
            return Err(ValidationError::MissingRecipientInfo);
        }

        if let Some(account_id) = self.receiver_account_id {
            return Ok(Recipient::Internal { account_id });
        }
        if let Some(key) = &self.pix_key {
            return Ok(Recipient::PixKey {
                key: key.value.clone(),
            });
        }
        self.external
            .complete()
            .map(Recipient::External)
            .ok_or(ValidationError::MissingRecipientInfo)
    }

    /// Request currency, or `default` when none was given.
    pub fn currency_or(&self, default: &str) -> Result<String, ValidationError> {
        let code = self.currency.as_deref().unwrap_or(default);
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(code.to_string())
        } else {
            Err(ValidationError::InvalidCurrency {
                code: code.to_string(),
            })
        }
    }

    pub fn validate_kind(&self) -> Result<(), ValidationError> {
        match self.kind {
            TransactionType::InstantTransfer
            | TransactionType::PixTransfer
            | TransactionType::SepaTransfer => Ok(()),
            TransactionType::Deposit | TransactionType::Withdrawal => {
                Err(ValidationError::UnsupportedTransactionType { kind: self.kind })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::identity::PixKeyType;

    use super::*;

    fn external() -> ExternalRecipient {
        ExternalRecipient {
            name: "Maria Silva".to_string(),
            bank: "237".to_string(),
            account: "12345-6".to_string(),
            document: Some("11144477735".to_string()),
        }
    }

    #[test]
    fn exactly_one_recipient_mode() {
        let amount = Decimal::new(100_00, 2);

        let req = TransferRequest::internal(amount, AccountId(2));
        assert_eq!(
            req.recipient().unwrap(),
            Recipient::Internal {
                account_id: AccountId(2)
            }
        );

        let key = PixKey::new("test@example.com", PixKeyType::Email);
        let req = TransferRequest::pix(amount, key.clone());
        assert_eq!(
            req.recipient().unwrap(),
            Recipient::PixKey {
                key: "test@example.com".to_string()
            }
        );

        let req = TransferRequest::external(amount, external());
        assert_eq!(req.recipient().unwrap(), Recipient::External(external()));

        // none
        let req = TransferRequest::base(amount, TransactionType::InstantTransfer);
        assert_eq!(req.recipient(), Err(ValidationError::MissingRecipientInfo));

        // more than one
        let mut req = TransferRequest::internal(amount, AccountId(2));
        req.pix_key = Some(key);
        assert_eq!(req.recipient(), Err(ValidationError::MissingRecipientInfo));

        // incomplete external triple
        let mut req = TransferRequest::external(amount, external());
        req.external.bank = None;
        assert_eq!(req.recipient(), Err(ValidationError::MissingRecipientInfo));
    }

    #[test]
    fn document_alone_does_not_select_external() {
        let mut req = TransferRequest::internal(Decimal::ONE, AccountId(2));
        req.external.document = Some("11144477735".to_string());
        assert!(matches!(req.recipient(), Ok(Recipient::Internal { .. })));
    }

    #[test]
    fn amount_and_currency() {
        let req = TransferRequest::internal(Decimal::new(1_001, 3), AccountId(1));
        assert!(matches!(
            req.validate_amount(),
            Err(ValidationError::InvalidAmount { .. })
        ));

        let req = TransferRequest::internal(Decimal::new(1_00, 2), AccountId(1));
        assert!(req.validate_amount().is_ok());
        assert_eq!(req.currency_or("BRL").unwrap(), "BRL");

        let req = req.with_currency("brl");
        assert!(matches!(
            req.currency_or("BRL"),
            Err(ValidationError::InvalidCurrency { .. })
        ));
    }

    #[test]
    fn deposits_are_not_transfers() {
        let req = TransferRequest::internal(Decimal::ONE, AccountId(1))
            .with_kind(TransactionType::Deposit);
        assert_eq!(
            req.validate_kind(),
            Err(ValidationError::UnsupportedTransactionType {
                kind: TransactionType::Deposit
            })
        );
    }

    #[test]
    fn create_account_shape() {
        assert!(CreateAccountCommand::new("001", "0001").validate().is_ok());
        assert!(matches!(
            CreateAccountCommand::new("01", "0001").validate(),
            Err(ValidationError::InvalidBankCode { .. })
        ));
        assert!(matches!(
            CreateAccountCommand::new("001", "1").validate(),
            Err(ValidationError::InvalidBranchCode { .. })
        ));
        let bad_key = PixKey::new("12345678901", PixKeyType::Cpf);
        assert_eq!(
            CreateAccountCommand::new("001", "0001")
                .with_pix_key(bad_key)
                .validate(),
            Err(ValidationError::InvalidPixKey {
                kind: PixKeyType::Cpf
            })
        );
    }
}
