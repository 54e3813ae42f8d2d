use super::transaction::Asset;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Domain warnings emitted while reading the ledger or matching lots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Warning {
    /// Disposal could not be fully matched against earlier acquisitions.
    /// When `units_matched = 0`, no cost basis was found at all.
    UnmatchedDisposal {
        asset: Asset,
        timestamp: DateTime<Utc>,
        units: Decimal,
        units_matched: Decimal,
    },
    /// Held balance went below zero after disposals and withdrawals.
    NegativeBalance { asset: Asset, units: Decimal },
    /// Input value had more fractional digits than the engine keeps and was rounded.
    ExcessPrecision {
        line: usize,
        field: &'static str,
        value: String,
    },
}

impl Warning {
    pub fn name(&self) -> &'static str {
        match self {
            Warning::UnmatchedDisposal { units_matched, .. } if units_matched.is_zero() => {
                "NoCostBasis"
            }
            Warning::UnmatchedDisposal { .. } => "UnmatchedDisposal",
            Warning::NegativeBalance { .. } => "NegativeBalance",
            Warning::ExcessPrecision { .. } => "ExcessPrecision",
        }
    }
}
