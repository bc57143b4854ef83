//! Conversions between base-unit integers and decimal display strings.
//!
//! All arithmetic happens on `u128` base units. Decimal strings exist only
//! at the edges: what the ledger hands back for display and what the user
//! types into a transfer form.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("not a decimal amount: {0:?}")]
    Invalid(String),

    #[error("amount has more than {decimals} fractional digits")]
    TooPrecise { decimals: u8 },

    #[error("amount does not fit in 128 bits")]
    Overflow,
}

fn scale(decimals: u8) -> Result<u128, UnitsError> {
    10u128
        .checked_pow(u32::from(decimals))
        .ok_or(UnitsError::Overflow)
}

/// Render `raw` base units with `decimals` places: `42_000 @ 3 → "42.0"`,
/// `1_500 @ 3 → "1.5"`. Zero-decimal tokens render as plain integers.
///
/// Descriptors never carry more than `MAX_TOKEN_DECIMALS`. Past that limit
/// `10^decimals` does not fit a `u128` and the raw integer is returned
/// unscaled.
pub fn format_units(raw: u128, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let Ok(divisor) = scale(decimals) else {
        return raw.to_string();
    };

    let whole = raw / divisor;
    let fraction = raw % divisor;
    let fraction = format!("{:0width$}", fraction, width = decimals as usize);
    let trimmed = fraction.trim_end_matches('0');

    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}

/// Parse a user-typed decimal amount into base units.
pub fn parse_units(text: &str, decimals: u8) -> Result<u128, UnitsError> {
    let text = text.trim();
    let invalid = || UnitsError::Invalid(text.to_string());

    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(UnitsError::TooPrecise { decimals });
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| UnitsError::Overflow)?
    };
    let frac_value: u128 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().map_err(|_| UnitsError::Overflow)?
    };
    let frac_scale = scale(decimals - fraction.len() as u8)?;

    whole
        .checked_mul(scale(decimals)?)
        .and_then(|w| w.checked_add(frac_value * frac_scale))
        .ok_or(UnitsError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_whole_amount_keeps_one_fractional_digit() {
        assert_eq!(format_units(42_000_000_000_000_000_000, 18), "42.0");
        assert_eq!(format_units(0, 6), "0.0");
    }

    #[test]
    fn format_trims_trailing_zeros() {
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(1, 6), "0.000001");
    }

    #[test]
    fn format_zero_decimals() {
        assert_eq!(format_units(7, 0), "7");
    }

    #[test]
    fn format_past_u128_scale_returns_raw() {
        assert_eq!(format_units(123, 39), "123");
    }

    #[test]
    fn parse_whole_and_fractional() {
        assert_eq!(parse_units("1.5", 6).unwrap(), 1_500_000);
        assert_eq!(parse_units("42", 2).unwrap(), 4_200);
        assert_eq!(parse_units(".25", 2).unwrap(), 25);
        assert_eq!(parse_units("3.", 1).unwrap(), 30);
        assert_eq!(parse_units("0.100", 1).unwrap(), 1);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_units("", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units(".", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("-1", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("1e5", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("1.2.3", 6), Err(UnitsError::Invalid(_))));
    }

    #[test]
    fn parse_rejects_excess_precision() {
        assert_eq!(
            parse_units("0.001", 2),
            Err(UnitsError::TooPrecise { decimals: 2 })
        );
    }

    #[test]
    fn parse_detects_overflow() {
        let huge = "9".repeat(40);
        assert_eq!(parse_units(&huge, 0), Err(UnitsError::Overflow));
        assert_eq!(parse_units("1", 39), Err(UnitsError::Overflow));
    }

    #[test]
    fn format_then_parse_is_identity_for_typical_amounts() {
        for (raw, decimals) in [(123_456_789u128, 6u8), (10u128.pow(18), 18), (5, 0)] {
            assert_eq!(parse_units(&format_units(raw, decimals), decimals).unwrap(), raw);
        }
    }
}
