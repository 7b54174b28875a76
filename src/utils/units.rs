//! Decimal rendering of integer base-unit amounts
//!
//! Amounts arrive as unbounded integers (satoshis, wei, drops), so scaling
//! works on decimal digit strings rather than floats.

use crate::error::{RecoveryError, RecoveryResult};

/// Scale an integer digit string down by `decimals`, trimming trailing zeros.
///
/// `format_units("1000000", 8) == "0.01"`, `format_units("5", 0) == "5"`.
pub fn format_units(raw: &str, decimals: u32) -> RecoveryResult<String> {
    let digits = normalize_digits(raw)?;
    let decimals = decimals as usize;

    let (int_part, frac_part) = split_digits(&digits, decimals);
    let frac_trimmed = frac_part.trim_end_matches('0');

    if frac_trimmed.is_empty() {
        Ok(int_part)
    } else {
        Ok(format!("{}.{}", int_part, frac_trimmed))
    }
}

/// Scale with a fixed number of fractional digits, e.g. `100000000` at 7 → `10.0000000`
pub fn format_units_fixed(raw: &str, decimals: u32) -> RecoveryResult<String> {
    let digits = normalize_digits(raw)?;
    let (int_part, frac_part) = split_digits(&digits, decimals as usize);
    if frac_part.is_empty() {
        Ok(int_part)
    } else {
        Ok(format!("{}.{}", int_part, frac_part))
    }
}

fn normalize_digits(raw: &str) -> RecoveryResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RecoveryError::malformed_transaction(format!(
            "amount is not a non-negative integer: {:?}",
            raw
        )));
    }
    let stripped = trimmed.trim_start_matches('0');
    Ok(if stripped.is_empty() { "0".to_string() } else { stripped.to_string() })
}

fn split_digits(digits: &str, decimals: usize) -> (String, String) {
    if decimals == 0 {
        return (digits.to_string(), String::new());
    }
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits.to_string()
    };
    let split = padded.len() - decimals;
    (padded[..split].to_string(), padded[split..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units("1000000", 8).unwrap(), "0.01");
        assert_eq!(format_units("1000000000000000000", 18).unwrap(), "1");
        assert_eq!(format_units("500000", 6).unwrap(), "0.5");
        assert_eq!(format_units("123456789", 8).unwrap(), "1.23456789");
        assert_eq!(format_units("0", 8).unwrap(), "0");
        assert_eq!(format_units("00042", 0).unwrap(), "42");
        assert_eq!(format_units("1", 18).unwrap(), "0.000000000000000001");
    }

    #[test]
    fn test_format_units_fixed() {
        assert_eq!(format_units_fixed("100000000", 7).unwrap(), "10.0000000");
        assert_eq!(format_units_fixed("1", 7).unwrap(), "0.0000001");
        assert_eq!(format_units_fixed("0", 7).unwrap(), "0.0000000");
    }

    #[test]
    fn test_rejects_non_digits() {
        assert!(format_units("-5", 8).is_err());
        assert!(format_units("0x10", 8).is_err());
        assert!(format_units("", 8).is_err());
    }
}
