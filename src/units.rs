//! Exact tez / milli-tez / mutez conversion
//!
//! Amounts travel on the wire as decimal strings of mutez. Conversion goes
//! through `rust_decimal` so `1.5` tez is exactly `1500000` mutez; anything
//! that would leave a fractional mutez is rejected rather than rounded.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Tz,
    Mtz,
    Mutez,
}

impl Unit {
    fn decimals(self) -> u32 {
        match self {
            Unit::Tz => 6,
            Unit::Mtz => 3,
            Unit::Mutez => 0,
        }
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tz" => Ok(Unit::Tz),
            "mtz" => Ok(Unit::Mtz),
            "mutez" => Ok(Unit::Mutez),
            other => Err(UnitError::UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    #[error("amount {0} is negative")]
    Negative(Decimal),

    #[error("amount {0} is not a whole number of mutez")]
    FractionalMutez(Decimal),

    #[error("amount {0} overflows u64 mutez")]
    Overflow(Decimal),
}

/// Convert `amount` expressed in `from` into `to`, `None` when it overflows
pub fn format(from: Unit, to: Unit, amount: Decimal) -> Option<Decimal> {
    let mutez = amount.checked_mul(Decimal::from(10u64.pow(from.decimals())))?;
    mutez
        .checked_div(Decimal::from(10u64.pow(to.decimals())))
        .map(|d| d.normalize())
}

/// Convert an amount in `unit` to whole mutez
pub fn to_mutez(amount: Decimal, unit: Unit) -> Result<u64, UnitError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitError::Negative(amount));
    }
    let mutez = format(unit, Unit::Mutez, amount).ok_or(UnitError::Overflow(amount))?;
    if !mutez.fract().is_zero() {
        return Err(UnitError::FractionalMutez(amount));
    }
    mutez.to_u64().ok_or(UnitError::Overflow(amount))
}

/// Wire representation: decimal string of mutez
pub fn to_mutez_string(amount: Decimal, unit: Unit) -> Result<String, UnitError> {
    to_mutez(amount, unit).map(|m| m.to_string())
}
