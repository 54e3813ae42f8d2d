//! Ledger input: classification of raw records and fee attribution.

use super::precision;
use super::transaction::{Action, Asset, FeeLine, IdentityKey, Kind, Transaction, TxId};
use super::warnings::Warning;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use fifotax_derive::CsvColumns;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("fee on line {line} references no transaction: {key}")]
    UnmatchedFee { line: usize, key: IdentityKey },
    #[error("malformed record on line {line}: {reason} (row: {raw})")]
    MalformedRecord {
        line: usize,
        reason: String,
        raw: String,
    },
}

/// Column of the ledger CSV, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvColumn {
    pub position: usize,
    pub name: &'static str,
    /// The row must extend to this column
    pub required: bool,
    /// The cell may be empty
    pub nullable: bool,
    pub description: &'static str,
}

/// Raw ledger record. The file has no header row, columns are positional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, CsvColumns)]
pub struct LedgerRow {
    /// Event time (RFC3339, or YYYY-MM-DD for midnight UTC)
    pub timestamp: String,
    /// Asset symbol, case-insensitive (e.g., btc, ETH)
    pub asset: String,
    /// buy, deposit, reward, sell, withdraw or fee
    pub action: String,
    /// Quantity of the asset (empty on fee lines)
    pub units: Option<String>,
    /// Fiat value per unit; the fee amount on fee lines
    pub unit_price: Option<String>,
    /// Exchange reference linking a fee line to its trade
    #[serde(default)]
    pub reference: Option<String>,
}

impl fmt::Display for LedgerRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.timestamp,
            self.asset,
            self.action,
            self.units.as_deref().unwrap_or_default(),
            self.unit_price.as_deref().unwrap_or_default(),
            self.reference.as_deref().unwrap_or_default(),
        )
    }
}

/// What a record was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Transaction(TxId),
    Fee,
    Ignored,
}

/// Collects classified records. Fees are attributed when the builder is finished,
/// so a [`Ledger`] always carries its fees before any matching starts.
#[derive(Debug, Default)]
pub struct LedgerBuilder {
    transactions: Vec<Transaction>,
    fees: Vec<FeeLine>,
    keys: HashMap<IdentityKey, TxId>,
    lots: HashMap<Asset, Vec<TxId>>,
    warnings: Vec<Warning>,
}

impl LedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one raw record
    pub fn record(&mut self, row: &LedgerRow, line: usize) -> Result<Entry, LedgerError> {
        let is_fee = is_fee_label(&row.action);
        let action = Action::from_label(&row.action);
        if !is_fee && action.is_none() {
            log::debug!("Skipping line {}: unrecognised action '{}'", line, row.action);
            return Ok(Entry::Ignored);
        }

        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| {
            malformed(line, format!("invalid timestamp '{}'", row.timestamp), row)
        })?;
        let asset = Asset::new(&row.asset);
        if asset.as_str().is_empty() {
            return Err(malformed(line, "missing asset".to_string(), row));
        }
        let unit_price = self.amount(row.unit_price.as_deref(), "unit_price", line, row)?;
        let reference = row
            .reference
            .as_deref()
            .filter(|r| !is_blank(r))
            .map(str::to_string);

        let action = match action {
            Some(action) => action,
            None => {
                self.fees.push(FeeLine {
                    key: IdentityKey {
                        timestamp,
                        asset,
                        reference,
                    },
                    amount: unit_price,
                    line,
                });
                return Ok(Entry::Fee);
            }
        };

        let units = self.amount(row.units.as_deref(), "units", line, row)?;
        let id = TxId(self.transactions.len());
        let transaction = Transaction {
            id,
            timestamp,
            action,
            asset,
            units,
            unit_price,
            fee: Decimal::ZERO,
            reference,
        };

        if matches!(transaction.kind(), Kind::Acquisition | Kind::Disposal) {
            let key = transaction.identity_key();
            if let Some(previous) = self.keys.insert(key.clone(), id) {
                log::warn!(
                    "Lines share identity key {} (transactions {} and {}); fees attach to the later one",
                    key,
                    previous.0,
                    id.0
                );
            }
        }
        if transaction.kind().is_acquisition() {
            self.lots
                .entry(transaction.asset.clone())
                .or_default()
                .push(id);
        }

        self.transactions.push(transaction);
        Ok(Entry::Transaction(id))
    }

    /// Attribute fee lines to their transactions
    pub fn finish(mut self) -> Result<Ledger, LedgerError> {
        for fee in &self.fees {
            let id = self
                .keys
                .get(&fee.key)
                .copied()
                .ok_or_else(|| LedgerError::UnmatchedFee {
                    line: fee.line,
                    key: fee.key.clone(),
                })?;
            let transaction = &mut self.transactions[id.0];
            if !transaction.fee.is_zero() {
                log::debug!(
                    "Fee on line {} replaces fee {} for {}",
                    fee.line,
                    transaction.fee,
                    fee.key
                );
            }
            transaction.fee = fee.amount;
        }

        log::info!(
            "Read {} transactions and {} fee lines",
            self.transactions.len(),
            self.fees.len()
        );

        Ok(Ledger {
            transactions: self.transactions,
            lots: self.lots,
            warnings: self.warnings,
        })
    }

    fn amount(
        &mut self,
        value: Option<&str>,
        field: &'static str,
        line: usize,
        row: &LedgerRow,
    ) -> Result<Decimal, LedgerError> {
        let Some(value) = value.filter(|v| !is_blank(v)) else {
            return Ok(Decimal::ZERO);
        };
        let amount = Decimal::from_str(value)
            .or_else(|_| Decimal::from_scientific(value))
            .map_err(|e| malformed(line, format!("invalid {field} '{value}': {e}"), row))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(malformed(line, format!("negative {field} '{value}'"), row));
        }
        if precision::exceeds_scale(amount) {
            log::warn!(
                "Line {}: {} '{}' has more than {} decimal places and will be rounded",
                line,
                field,
                value,
                precision::SCALE
            );
            self.warnings.push(Warning::ExcessPrecision {
                line,
                field,
                value: value.to_string(),
            });
        }
        Ok(precision::round(amount))
    }
}

/// Classified transactions with fees attributed, in supplied order
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    /// Acquisitions per asset, in supplied order
    lots: HashMap<Asset, Vec<TxId>>,
    warnings: Vec<Warning>,
}

impl Ledger {
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn get(&self, id: TxId) -> &Transaction {
        &self.transactions[id.0]
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Acquisitions of an asset, oldest supplied first
    pub fn lots<'a>(&'a self, asset: &Asset) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.lots
            .get(asset)
            .into_iter()
            .flatten()
            .map(move |id| self.get(*id))
    }

    /// Disposals and relocations, in supplied order
    pub fn outgoing(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.kind().is_outgoing())
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// Position of the action label in a ledger row
const ACTION_FIELD: usize = 2;

fn is_fee_label(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case("fee")
}

/// Labels that produce a transaction or a fee line
fn is_ledger_action(label: &str) -> bool {
    is_fee_label(label) || Action::from_label(label).is_some()
}

/// Read a headerless ledger CSV: `timestamp,asset,action,units,unit_price[,reference]`
pub fn read_csv<R: Read>(reader: R) -> Result<Ledger, LedgerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let field_count = LedgerRow::columns().len();
    let required = LedgerRow::columns().iter().filter(|c| c.required).count();

    let mut builder = LedgerBuilder::new();
    for (index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| LedgerError::MalformedRecord {
            line: e.position().map_or(index + 1, |p| p.line() as usize),
            reason: e.to_string(),
            raw: String::new(),
        })?;
        let line = record.position().map_or(index + 1, |p| p.line() as usize);
        let raw = || record.iter().collect::<Vec<_>>().join(",");

        let short = record.len() < required;
        if short && record.len() > ACTION_FIELD && !is_ledger_action(&record[ACTION_FIELD]) {
            log::debug!("Skipping line {}: unrecognised action '{}'", line, &record[ACTION_FIELD]);
            continue;
        }
        if short || record.len() > field_count {
            return Err(LedgerError::MalformedRecord {
                line,
                reason: format!(
                    "expected {} to {} fields, found {}",
                    required,
                    field_count,
                    record.len()
                ),
                raw: raw(),
            });
        }

        let row: LedgerRow =
            record
                .deserialize(None)
                .map_err(|e| LedgerError::MalformedRecord {
                    line,
                    reason: e.to_string(),
                    raw: raw(),
                })?;
        if let Entry::Transaction(id) = builder.record(&row, line)? {
            log::trace!("Line {} is transaction {}", line, id.0);
        }
    }
    builder.finish()
}

/// Parse a timestamp that may be RFC3339, a naive datetime (UTC) or date-only
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Empty cells and the `null`/`undefined` placeholders older exports wrote
fn is_blank(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "null" || value == "undefined"
}

fn malformed(line: usize, reason: String, row: &LedgerRow) -> LedgerError {
    LedgerError::MalformedRecord {
        line,
        reason,
        raw: row.to_string(),
    }
}
