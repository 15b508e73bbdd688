use std::str::FromStr;

use rust_decimal::Decimal;

pub const CURRENCY_MARKER: &str = "R$";

/// Maximum number of fraction digits an amount may carry.
pub const MAX_SCALE: u32 = 2;

/// Formats an amount as Brazilian Real text, e.g. `R$ 1.234,56`.
///
/// Amounts are expected to carry at most two fraction digits; shorter scales
/// are padded, so `10` renders as `R$ 10,00`.
pub fn format_brl(amount: Decimal) -> String {
    let mut value = amount.abs();
    value.rescale(MAX_SCALE);
    let plain = value.to_string();
    // values near Decimal::MAX cannot hold two fraction digits
    let (integer, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), ""));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (idx, ch) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{CURRENCY_MARKER} {sign}{grouped},{fraction:0<2}")
}

/// Parses Brazilian Real text back into an amount.
///
/// Anything that cannot be read as a number yields zero, never an error.
pub fn parse_brl(text: &str) -> Decimal {
    let zero = Decimal::new(0, MAX_SCALE);
    if text.is_empty() {
        return zero;
    }

    let stripped = text.replace(CURRENCY_MARKER, "").replace(' ', "");
    let normalized = match stripped.rsplit_once(',') {
        Some((integer, fraction)) => format!("{}.{fraction}", integer.replace('.', "")),
        None => stripped.replace('.', ""),
    };

    Decimal::from_str(&normalized).unwrap_or(zero)
}

/// An amount is acceptable when it is strictly positive and has at most two
/// fraction digits. Trailing zeros count: `100.500` is rejected.
pub fn validate_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.scale() <= MAX_SCALE
}

/// Same as [`validate_amount`] for amounts still in their text form.
pub fn validate_amount_text(text: &str) -> bool {
    validate_amount(parse_brl(text))
}

/// Human readable account reference: `bank-branch-number`.
pub fn format_account_number(bank_code: &str, branch_code: &str, account_number: &str) -> String {
    format!("{bank_code}-{branch_code}-{account_number}")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn format_groups_thousands() {
        assert_eq!(format_brl(dec("1234.56")), "R$ 1.234,56");
        assert_eq!(format_brl(dec("0.99")), "R$ 0,99");
        assert_eq!(format_brl(dec("1000000.00")), "R$ 1.000.000,00");
        assert_eq!(format_brl(dec("100")), "R$ 100,00");
        assert_eq!(format_brl(dec("123456.7")), "R$ 123.456,70");
        assert_eq!(format_brl(Decimal::ZERO), "R$ 0,00");
    }

    #[test]
    fn format_pads_fraction_of_huge_amounts() {
        assert_eq!(
            format_brl(dec("1000000000000000000000000000")),
            "R$ 1.000.000.000.000.000.000.000.000.000,00"
        );
        assert!(format_brl(Decimal::MAX).ends_with(",00"));
    }

    #[test]
    fn format_negative_balance() {
        assert_eq!(format_brl(dec("-1234.5")), "R$ -1.234,50");
        assert_eq!(parse_brl("R$ -1.234,50"), dec("-1234.50"));
    }

    #[test]
    fn parse_localized_text() {
        assert_eq!(parse_brl("R$ 1.234,56"), dec("1234.56"));
        assert_eq!(parse_brl("R$ 0,99"), dec("0.99"));
        assert_eq!(parse_brl("1234,56"), dec("1234.56"));
        assert_eq!(parse_brl("R$1.000"), dec("1000"));
        assert_eq!(parse_brl("1.2.3,45"), dec("123.45"));
    }

    #[test]
    fn parse_falls_back_to_zero() {
        assert_eq!(parse_brl(""), Decimal::ZERO);
        assert_eq!(parse_brl("").scale(), 2);
        assert_eq!(parse_brl("R$ abc"), Decimal::ZERO);
        assert_eq!(parse_brl("R$"), Decimal::ZERO);
        assert_eq!(parse_brl("12,3,4x"), Decimal::ZERO);
    }

    #[test]
    fn amount_validation() {
        assert!(validate_amount(dec("100.50")));
        assert!(validate_amount(dec("0.01")));
        assert!(!validate_amount(dec("0")));
        assert!(!validate_amount(dec("-5.00")));
        assert!(!validate_amount(dec("100.555")));
        assert!(!validate_amount(dec("100.500")));
        assert!(validate_amount_text("R$ 100,50"));
        assert!(!validate_amount_text(""));
    }

    #[test]
    fn account_number_display() {
        assert_eq!(format_account_number("001", "1234", "00012345"), "001-1234-00012345");
    }

    proptest! {
        #[test]
        fn parse_inverts_format(cents in -10_000_000_000i64..10_000_000_000i64) {
            let amount = Decimal::new(cents, 2);
            prop_assert_eq!(parse_brl(&format_brl(amount)), amount);
        }

        #[test]
        fn parse_inverts_format_for_short_scales(value in 0i64..100_000_000i64, scale in 0u32..=1) {
            let amount = Decimal::new(value, scale);
            prop_assert_eq!(parse_brl(&format_brl(amount)), amount);
        }
    }
}
