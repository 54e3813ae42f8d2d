use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Asset identifier, normalized to lowercase (e.g. "btc")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(symbol: &str) -> Self {
        Asset(symbol.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a user supplied symbol
    pub fn matches(&self, symbol: &str) -> bool {
        self.0.eq_ignore_ascii_case(symbol.trim())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Action label of a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Deposit,
    Reward,
    Sell,
    Withdraw,
}

impl Action {
    /// Map a record label to an action. Fee lines are not actions.
    pub fn from_label(label: &str) -> Option<Action> {
        match label.trim().to_lowercase().as_str() {
            "buy" => Some(Action::Buy),
            "deposit" => Some(Action::Deposit),
            "reward" => Some(Action::Reward),
            "sell" => Some(Action::Sell),
            "withdraw" => Some(Action::Withdraw),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Deposit => "deposit",
            Action::Reward => "reward",
            Action::Sell => "sell",
            Action::Withdraw => "withdraw",
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Action::Buy | Action::Deposit | Action::Reward => Kind::Acquisition,
            Action::Sell => Kind::Disposal,
            Action::Withdraw => Kind::RelocationOut,
        }
    }
}

/// How a transaction is treated by the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Opens a lot (purchases, deposits, rewards)
    Acquisition,
    /// Consumes lots and realizes a gain
    Disposal,
    /// Removes units from the balance without a taxable event
    RelocationOut,
}

impl Kind {
    pub fn is_acquisition(&self) -> bool {
        matches!(self, Kind::Acquisition)
    }

    /// Disposals and relocations both leave the held balance
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Kind::Disposal | Kind::RelocationOut)
    }
}

/// Index of a transaction in its ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TxId(pub usize);

/// Composite key linking a separately recorded fee line to its transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub timestamp: DateTime<Utc>,
    pub asset: Asset,
    pub reference: Option<String>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            format_timestamp(self.timestamp),
            self.asset,
            self.reference.as_deref().unwrap_or("null")
        )
    }
}

/// A single acquisition, disposal or relocation of one asset
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TxId,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub asset: Asset,
    pub units: Decimal,
    /// Zero when unknown, giving acquisitions a zero cost basis
    pub unit_price: Decimal,
    /// Attributed from a fee line
    pub fee: Decimal,
    pub reference: Option<String>,
}

impl Transaction {
    pub fn kind(&self) -> Kind {
        self.action.kind()
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            timestamp: self.timestamp,
            asset: self.asset.clone(),
            reference: self.reference.clone(),
        }
    }
}

/// Fiat fee recorded on its own line, keyed to a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct FeeLine {
    pub key: IdentityKey,
    pub amount: Decimal,
    pub line: usize,
}

/// Timestamps are written as UTC with millisecond precision
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
