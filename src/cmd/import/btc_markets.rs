//! Reshape a BTC Markets transaction export into ledger rows.
//!
//! Export rows are `id,date,recordType,actionType,currency,amount,description,balance,refId`.
//! Trade fees are exported in AUD against the trade's `refId`, so their coin is
//! taken from the buy or sell carrying the same reference.

use crate::tax::ledger::parse_timestamp;
use crate::tax::precision::ArithmeticError;
use crate::tax::transaction::format_timestamp;
use crate::tax::{Action, ActionAudit, Asset, LedgerRow};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;
use std::sync::LazyLock;

static AUD_PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@ AUD ([\d.]*)").expect("valid regex"));
static MATCHED_AT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"matched at ([\d.]*)").expect("valid regex"));
static MATCHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(Fully|Partially) matched").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("fee on line {line} references unknown trade {ref_id}")]
    OrphanFee { line: usize, ref_id: String },
    #[error("invalid {field} '{value}' on line {line}")]
    InvalidValue {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    #[serde(rename = "id")]
    pub _id: String,
    pub date: String,
    pub record_type: String,
    pub action_type: String,
    pub currency: String,
    pub amount: String,
    pub description: String,
    #[serde(default, rename = "balance")]
    pub _balance: Option<String>,
    #[serde(default)]
    pub ref_id: Option<String>,
}

/// How an export action maps to a ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mapped {
    Action(Action),
    Fee,
}

impl Mapped {
    fn from_action_type(action_type: &str) -> Option<Mapped> {
        match action_type.trim() {
            "Buy Order" => Some(Mapped::Action(Action::Buy)),
            "Sell Order" => Some(Mapped::Action(Action::Sell)),
            "Trading Fee" => Some(Mapped::Fee),
            "Withdraw" => Some(Mapped::Action(Action::Withdraw)),
            "Deposit" => Some(Mapped::Action(Action::Deposit)),
            _ => None,
        }
    }
}

/// Ledger rows plus per-coin unit counters for the rows kept
#[derive(Debug, Default)]
pub struct Transposed {
    pub rows: Vec<LedgerRow>,
    pub audit: ActionAudit,
}

/// A kept export row, before fee coins are resolved
struct Pending {
    line: usize,
    timestamp: String,
    coin: Asset,
    mapped: Mapped,
    units: Decimal,
    unit_price: Option<Decimal>,
    ref_id: Option<String>,
}

pub fn transpose<R: Read>(reader: R) -> Result<Transposed, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pending = Vec::new();
    let mut trade_coins: HashMap<String, Asset> = HashMap::new();

    for (index, result) in rdr.records().enumerate() {
        let record = result?;
        let line = record.position().map_or(index + 1, |p| p.line() as usize);
        let record: Record = record.deserialize(None)?;

        let Some(row) = classify(&record, line)? else {
            log::debug!("Skipping export line {}: {} {}", line, record.record_type, record.action_type);
            continue;
        };

        if matches!(row.mapped, Mapped::Action(Action::Buy | Action::Sell)) {
            if let Some(ref_id) = &row.ref_id {
                trade_coins.insert(ref_id.clone(), row.coin.clone());
            }
        }
        pending.push(row);
    }

    let mut transposed = Transposed::default();
    for row in pending {
        let ledger_row = match row.mapped {
            Mapped::Fee => {
                let ref_id = row.ref_id.unwrap_or_default();
                let coin = trade_coins
                    .get(&ref_id)
                    .ok_or_else(|| ImportError::OrphanFee {
                        line: row.line,
                        ref_id: ref_id.clone(),
                    })?;
                LedgerRow {
                    timestamp: row.timestamp,
                    asset: coin.to_string(),
                    action: "fee".to_string(),
                    units: None,
                    unit_price: Some((-row.units).normalize().to_string()),
                    reference: Some(ref_id),
                }
            }
            Mapped::Action(action) => {
                transposed.audit.record(&row.coin, action, row.units)?;
                LedgerRow {
                    timestamp: row.timestamp,
                    asset: row.coin.to_string(),
                    action: action.label().to_string(),
                    units: Some(row.units.normalize().to_string()),
                    unit_price: row.unit_price.map(|p| p.normalize().to_string()),
                    reference: row.ref_id,
                }
            }
        };
        transposed.rows.push(ledger_row);
    }

    log::info!("Transposed {} export rows", transposed.rows.len());
    Ok(transposed)
}

/// Map one export record, or `None` when it does not belong in the ledger
fn classify(record: &Record, line: usize) -> Result<Option<Pending>, ImportError> {
    let Some(mapped) = Mapped::from_action_type(&record.action_type) else {
        return Ok(None);
    };
    let is_transfer = matches!(
        mapped,
        Mapped::Action(Action::Withdraw | Action::Deposit)
    );
    if !is_transfer && mapped != Mapped::Fee && record.record_type.trim() != "Trade" {
        return Ok(None);
    }

    let coin = Asset::new(&record.currency);
    if coin.as_str() == "aud" && mapped != Mapped::Fee {
        return Ok(None);
    }

    let amount = parse_amount(&record.amount).ok_or_else(|| ImportError::InvalidValue {
        line,
        field: "amount",
        value: record.amount.clone(),
    })?;
    // Sells and withdrawals are exported as negative amounts
    let units = match mapped {
        Mapped::Action(Action::Sell | Action::Withdraw) => -amount,
        _ => amount,
    };

    let unit_price = match mapped {
        Mapped::Action(action) => unit_price(action, &record.description),
        Mapped::Fee => None,
    };
    if !is_transfer && mapped != Mapped::Fee && unit_price.is_none() {
        return Ok(None);
    }

    let timestamp = parse_timestamp(&record.date).ok_or_else(|| ImportError::InvalidValue {
        line,
        field: "date",
        value: record.date.clone(),
    })?;

    Ok(Some(Pending {
        line,
        timestamp: format_timestamp(timestamp),
        coin,
        mapped,
        units,
        unit_price,
        ref_id: record.ref_id.clone().filter(|r| !r.is_empty()),
    }))
}

/// Unit price from the description; zero or missing prices are `None`
fn unit_price(action: Action, description: &str) -> Option<Decimal> {
    match action {
        Action::Buy | Action::Deposit => {
            if !description.contains("Trade settled") {
                return None;
            }
            capture(&AUD_PRICE, description)
        }
        Action::Sell | Action::Withdraw => {
            if action == Action::Sell && !MATCHED.is_match(description) {
                return None;
            }
            capture(&MATCHED_AT, description).or_else(|| capture(&AUD_PRICE, description))
        }
        Action::Reward => None,
    }
}

fn capture(regex: &Regex, description: &str) -> Option<Decimal> {
    regex
        .captures(description)
        .and_then(|c| c.get(1))
        .and_then(|m| Decimal::from_str(m.as_str()).ok())
        .filter(|price| !price.is_zero())
}

fn parse_amount(value: &str) -> Option<Decimal> {
    let value = value.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}
