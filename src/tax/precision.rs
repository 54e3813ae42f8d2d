//! Fixed-precision decimal arithmetic.
//!
//! Every unit and fiat quantity in the engine passes through these helpers so that
//! results are rounded to [`SCALE`] fractional digits after each operation. Lot
//! exhaustion is detected by exact equality, which only holds if no residue below
//! the scale is allowed to accumulate across partial matches.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept after every operation.
pub const SCALE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticError {
    #[error("division by zero: {dividend} / 0")]
    DivisionByZero { dividend: Decimal },
    #[error("{x} {op} {y} is outside the decimal range")]
    Overflow { op: char, x: Decimal, y: Decimal },
}

/// Round to [`SCALE`] digits, halves away from zero.
pub fn round(x: Decimal) -> Decimal {
    x.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

pub fn add(x: Decimal, y: Decimal) -> Result<Decimal, ArithmeticError> {
    x.checked_add(y)
        .map(round)
        .ok_or(ArithmeticError::Overflow { op: '+', x, y })
}

pub fn sub(x: Decimal, y: Decimal) -> Result<Decimal, ArithmeticError> {
    x.checked_sub(y)
        .map(round)
        .ok_or(ArithmeticError::Overflow { op: '-', x, y })
}

pub fn mul(x: Decimal, y: Decimal) -> Result<Decimal, ArithmeticError> {
    x.checked_mul(y)
        .map(round)
        .ok_or(ArithmeticError::Overflow { op: '*', x, y })
}

pub fn div(x: Decimal, y: Decimal) -> Result<Decimal, ArithmeticError> {
    if y.is_zero() {
        return Err(ArithmeticError::DivisionByZero { dividend: x });
    }
    x.checked_div(y)
        .map(round)
        .ok_or(ArithmeticError::Overflow { op: '/', x, y })
}

/// Sum an iterator of values, rounding after each addition.
pub fn sum<I>(values: I) -> Result<Decimal, ArithmeticError>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, add)
}

/// True if the value carries more fractional digits than the engine keeps.
pub fn exceeds_scale(x: Decimal) -> bool {
    x.normalize().scale() > SCALE
}
