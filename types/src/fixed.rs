//! Scaled fixed-point parsing of decimal strings.
//!
//! Balances arrive as decimal strings and are carried internally as
//! scaled integers. Excess fractional digits are truncated (round toward
//! zero), matching how the upstream data sets were produced.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{Error, Result};

/// Parse a decimal string into an integer scaled by `10^decimals`.
pub fn parse_scaled(input: &str, decimals: u32) -> Result<i128> {
    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(Error::Decode(format!("empty decimal value {input:?}")));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(Error::Decode(format!("malformed decimal value {input:?}")));
    }

    let mut frac: String = frac_part.chars().take(decimals as usize).collect();
    while frac.len() < decimals as usize {
        frac.push('0');
    }
    let combined = format!("{}{}", if int_part.is_empty() { "0" } else { int_part }, frac);
    let mut value: BigInt = combined
        .parse()
        .map_err(|e| Error::Decode(format!("decimal value {input:?}: {e}")))?;
    if negative {
        value = -value;
    }
    value
        .to_i128()
        .ok_or_else(|| Error::Decode(format!("decimal value {input:?} overflows")))
}

pub fn parse_scaled_i64(input: &str, decimals: u32) -> Result<i64> {
    let v = parse_scaled(input, decimals)?;
    i64::try_from(v).map_err(|_| Error::Decode(format!("value {input:?} overflows i64")))
}

pub fn parse_scaled_u64(input: &str, decimals: u32) -> Result<u64> {
    let v = parse_scaled(input, decimals)?;
    u64::try_from(v).map_err(|_| Error::Decode(format!("value {input:?} overflows u64")))
}

/// Format a scaled integer back into a trimmed decimal string.
pub fn format_scaled(value: i128, decimals: u32) -> String {
    let scale = 10i128.pow(decimals);
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    let int_part = magnitude / scale as u128;
    let frac_part = magnitude % scale as u128;
    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }
    let frac = format!("{frac_part:0width$}", width = decimals as usize);
    format!("{sign}{int_part}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fractional() {
        assert_eq!(parse_scaled("0.0", 8).unwrap(), 0);
        assert_eq!(parse_scaled("1", 8).unwrap(), 100_000_000);
        assert_eq!(parse_scaled("1.5", 8).unwrap(), 150_000_000);
        assert_eq!(parse_scaled("-2.25", 2).unwrap(), -225);
        assert_eq!(parse_scaled(".5", 2).unwrap(), 50);
    }

    #[test]
    fn truncates_excess_digits() {
        assert_eq!(parse_scaled("0.123456789", 8).unwrap(), 12_345_678);
        assert_eq!(parse_scaled("-0.999", 2).unwrap(), -99);
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_scaled("abc", 8).is_err());
        assert!(parse_scaled("1.2.3", 8).is_err());
        assert!(parse_scaled("", 8).is_err());
        assert!(parse_scaled_u64("-1", 8).is_err());
    }

    #[test]
    fn formats_trimmed() {
        assert_eq!(format_scaled(150_000_000, 8), "1.5");
        assert_eq!(format_scaled(-225, 2), "-2.25");
        assert_eq!(format_scaled(0, 8), "0");
        assert_eq!(format_scaled(100_000_000, 8), "1");
    }

    #[test]
    fn round_trips() {
        for s in ["1.5", "-2.25", "0", "123456.789"] {
            let v = parse_scaled(s, 8).unwrap();
            assert_eq!(parse_scaled(&format_scaled(v, 8), 8).unwrap(), v);
        }
    }
}
