//! Amount parsing for provider callbacks.
//!
//! Both providers bill in integer units (sum for Click, tiyin for Payme),
//! but the callbacks deliver amounts as JSON numbers, or as strings with
//! spaces and either decimal separator. Every amount entering the system
//! goes through this module exactly once.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Minor units per sum.
pub const TIYIN_PER_SUM: i64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid amount")]
    InvalidAmount,
}

/// Parses a provider amount string into an integer amount.
///
/// Whitespace is stripped, `,` is accepted as a decimal separator. A value
/// with a non-zero fractional part is rejected: neither provider is allowed
/// to bill fractional units.
pub fn parse_amount(raw: &str) -> Result<i64, MoneyError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = cleaned.replace(',', ".");
    if cleaned.is_empty() {
        return Err(MoneyError::InvalidAmount);
    }

    let value = Decimal::from_str(&cleaned).map_err(|_| MoneyError::InvalidAmount)?;
    if value != value.trunc() {
        return Err(MoneyError::InvalidAmount);
    }

    value.trunc().to_i64().ok_or(MoneyError::InvalidAmount)
}

/// Parses an amount out of a JSON value that may be a number or a string.
pub fn amount_from_json(value: &serde_json::Value) -> Result<i64, MoneyError> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(MoneyError::InvalidAmount),
            }
        }
        serde_json::Value::String(s) => parse_amount(s),
        _ => Err(MoneyError::InvalidAmount),
    }
}

/// Converts an integer sum amount into tiyin.
pub fn to_tiyin(sum: i64) -> i64 {
    sum * TIYIN_PER_SUM
}
