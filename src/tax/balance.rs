use super::ledger::Ledger;
use super::matcher::{MatchOutcome, Order};
use super::precision::{add, div, sub, sum, ArithmeticError};
use super::transaction::{Action, Asset, Kind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Units held per asset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Balances {
    units: BTreeMap<Asset, Decimal>,
}

impl Balances {
    /// Balances before any disposal: every acquisition credited
    pub fn opening(ledger: &Ledger) -> Result<Self, ArithmeticError> {
        let mut balances = Balances::default();
        for transaction in ledger.transactions() {
            let units = if transaction.kind().is_acquisition() {
                transaction.units
            } else {
                Decimal::ZERO
            };
            balances.credit(&transaction.asset, units)?;
        }
        Ok(balances)
    }

    pub fn credit(&mut self, asset: &Asset, units: Decimal) -> Result<(), ArithmeticError> {
        let held = self.units.entry(asset.clone()).or_default();
        *held = add(*held, units)?;
        Ok(())
    }

    pub fn debit(&mut self, asset: &Asset, units: Decimal) -> Result<(), ArithmeticError> {
        let held = self.units.entry(asset.clone()).or_default();
        *held = sub(*held, units)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn held(&self, asset: &Asset) -> Decimal {
        self.units.get(asset).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, Decimal)> {
        self.units.iter().map(|(asset, units)| (asset, *units))
    }

    pub fn negative(&self) -> impl Iterator<Item = (&Asset, Decimal)> {
        self.iter().filter(|(_, units)| units.is_sign_negative() && !units.is_zero())
    }
}

/// Units per action label for one asset, taken from the raw ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetAudit {
    pub units: BTreeMap<Action, Decimal>,
    /// Acquired minus disposed and withdrawn
    pub active: Decimal,
}

impl AssetAudit {
    pub fn units(&self, action: Action) -> Decimal {
        self.units.get(&action).copied().unwrap_or_default()
    }
}

/// Per asset, per action unit counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionAudit {
    assets: BTreeMap<Asset, AssetAudit>,
}

impl ActionAudit {
    pub fn from_ledger(ledger: &Ledger) -> Result<Self, ArithmeticError> {
        let mut audit = ActionAudit::default();
        for transaction in ledger.transactions() {
            audit.record(&transaction.asset, transaction.action, transaction.units)?;
        }
        Ok(audit)
    }

    pub fn record(
        &mut self,
        asset: &Asset,
        action: Action,
        units: Decimal,
    ) -> Result<(), ArithmeticError> {
        let entry = self.assets.entry(asset.clone()).or_default();
        let total = entry.units.entry(action).or_default();
        *total = add(*total, units)?;
        entry.active = match action.kind() {
            Kind::Acquisition => add(entry.active, units)?,
            Kind::Disposal | Kind::RelocationOut => sub(entry.active, units)?,
        };
        Ok(())
    }

    #[cfg(test)]
    pub fn get(&self, asset: &Asset) -> Option<&AssetAudit> {
        self.assets.get(asset)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, &AssetAudit)> {
        self.assets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Price at which selling the whole held balance realizes no gross gain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakeven {
    pub asset: Asset,
    pub units: Decimal,
    /// Remaining cost basis of the held units
    pub value: Decimal,
    /// `None` when the unit price cannot be derived
    pub unit_price: Option<Decimal>,
}

/// Liquidate every positive balance at a zero price against a copy of the lot
/// book. The remaining cost basis is the negated gross gain of those matches.
pub fn breakeven(
    ledger: &Ledger,
    outcome: &MatchOutcome,
    as_of: DateTime<Utc>,
) -> Result<Vec<Breakeven>, ArithmeticError> {
    let mut book = outcome.book.clone();
    let mut results = Vec::new();

    for (asset, units) in outcome.balances.iter() {
        if units <= Decimal::ZERO {
            continue;
        }

        let mut order = Order::notional(asset, as_of, units, Decimal::ZERO);
        let produced = book.fill(ledger, &mut order)?;
        let gross_gain = sum(book.matches()[produced].iter().map(|m| m.gross_gain))?;
        let value = sub(Decimal::ZERO, gross_gain)?;

        if value.is_zero() {
            log::debug!("No remaining cost basis for {}", asset);
            continue;
        }

        let unit_price = match div(value, units) {
            Ok(price) => Some(price.normalize()),
            Err(e) => {
                log::debug!("No breakeven price for {}: {}", asset, e);
                None
            }
        };

        results.push(Breakeven {
            asset: asset.clone(),
            units: units.normalize(),
            value: value.normalize(),
            unit_price,
        });
    }

    Ok(results)
}
