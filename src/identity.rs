use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CPF_LEN: usize = 11;
const CNPJ_LEN: usize = 14;

const CNPJ_FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixKeyType {
    Cpf,
    Cnpj,
    Email,
    Phone,
    Random,
}

impl PixKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixKeyType::Cpf => "cpf",
            PixKeyType::Cnpj => "cnpj",
            PixKeyType::Email => "email",
            PixKeyType::Phone => "phone",
            PixKeyType::Random => "random",
        }
    }
}

impl fmt::Display for PixKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown PIX key type `{0}`")]
pub struct UnknownPixKeyType(pub String);

impl FromStr for PixKeyType {
    type Err = UnknownPixKeyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpf" => Ok(PixKeyType::Cpf),
            "cnpj" => Ok(PixKeyType::Cnpj),
            "email" => Ok(PixKeyType::Email),
            "phone" => Ok(PixKeyType::Phone),
            "random" => Ok(PixKeyType::Random),
            other => Err(UnknownPixKeyType(other.to_string())),
        }
    }
}

/// A payment key together with the type it claims to be.
///
/// Construction does not validate; see [`PixKey::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixKey {
    pub value: String,
    pub kind: PixKeyType,
}

impl PixKey {
    pub fn new(value: impl Into<String>, kind: PixKeyType) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    pub fn is_valid(&self) -> bool {
        validate_pix_key(&self.value, self.kind)
    }
}

fn normalize_digits(raw: &str) -> Vec<u32> {
    raw.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_identical(digits: &[u32]) -> bool {
    digits.windows(2).all(|pair| pair[0] == pair[1])
}

/// MOD-11 check digit over `digits`, weighted position by position.
fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let remainder = sum % 11;
    if remainder < 2 { 0 } else { 11 - remainder }
}

/// Validates an individual taxpayer number (CPF). Punctuation is ignored.
pub fn validate_cpf(raw: &str) -> bool {
    let digits = normalize_digits(raw);
    if digits.len() != CPF_LEN || all_identical(&digits) {
        return false;
    }

    let first_weights: Vec<u32> = (2..=10).rev().collect();
    let second_weights: Vec<u32> = (2..=11).rev().collect();

    check_digit(&digits[..9], &first_weights) == digits[9]
        && check_digit(&digits[..10], &second_weights) == digits[10]
}

/// Validates a corporate taxpayer number (CNPJ). Punctuation is ignored.
pub fn validate_cnpj(raw: &str) -> bool {
    let digits = normalize_digits(raw);
    if digits.len() != CNPJ_LEN || all_identical(&digits) {
        return false;
    }

    check_digit(&digits[..12], &CNPJ_FIRST_WEIGHTS) == digits[12]
        && check_digit(&digits[..13], &CNPJ_SECOND_WEIGHTS) == digits[13]
}

fn is_email(key: &str) -> bool {
    let Some((local, domain)) = key.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c));
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic());

    local_ok && host_ok && tld_ok
}

/// `+55` followed by area code and subscriber number, 10 or 11 digits total.
fn is_phone(key: &str) -> bool {
    key.strip_prefix("+55").is_some_and(|rest| {
        (10..=11).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_digit())
    })
}

/// Only the canonical hyphenated form is accepted, in either case.
fn is_random_key(key: &str) -> bool {
    key.len() == 36 && Uuid::try_parse(key).is_ok()
}

pub fn validate_pix_key(key: &str, kind: PixKeyType) -> bool {
    if key.is_empty() {
        return false;
    }
    match kind {
        PixKeyType::Cpf => validate_cpf(key),
        PixKeyType::Cnpj => validate_cnpj(key),
        PixKeyType::Email => is_email(key),
        PixKeyType::Phone => is_phone(key),
        PixKeyType::Random => is_random_key(key),
    }
}

pub fn validate_bank_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_branch_code(code: &str) -> bool {
    code.len() == 4 && code.chars().all(|c| c.is_ascii_digit())
}

/// `000.000.000-00`. Input with the wrong number of digits is returned as
/// bare digits.
pub fn format_cpf(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != CPF_LEN {
        return digits;
    }
    format!(
        "{}.{}.{}-{}",
        &digits[..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..]
    )
}

/// `00.000.000/0000-00`. Input with the wrong number of digits is returned as
/// bare digits.
pub fn format_cnpj(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != CNPJ_LEN {
        return digits;
    }
    format!(
        "{}.{}.{}/{}-{}",
        &digits[..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12],
        &digits[12..]
    )
}
