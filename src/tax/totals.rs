use super::financial_year::FinancialYear;
use super::matcher::MatchRecord;
use super::precision::{add, ArithmeticError};
use super::transaction::Asset;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rollup of every match for one asset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetTotals {
    pub acquisition_value: Decimal,
    pub disposal_value: Decimal,
    pub fees: Decimal,
    pub taxable_gain: Decimal,
}

/// Rollup of every match for one financial year
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinancialYearTotals {
    pub acquisition_value: Decimal,
    pub disposal_value: Decimal,
    pub fees: Decimal,
    pub gross_gain: Decimal,
    /// Includes the loss carried forward from the previous year
    pub taxable_gain: Decimal,
    pub carried_forward: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    assets: BTreeMap<Asset, AssetTotals>,
    years: BTreeMap<FinancialYear, FinancialYearTotals>,
}

impl Totals {
    pub fn from_matches<'a>(
        matches: impl IntoIterator<Item = &'a MatchRecord>,
    ) -> Result<Self, ArithmeticError> {
        let mut totals = Totals::default();
        for record in matches {
            totals.record(record)?;
        }
        Ok(totals)
    }

    pub fn record(&mut self, record: &MatchRecord) -> Result<(), ArithmeticError> {
        let asset = self.assets.entry(record.asset.clone()).or_default();
        asset.acquisition_value = add(asset.acquisition_value, record.acquisition_value)?;
        asset.disposal_value = add(asset.disposal_value, record.disposal_value)?;
        asset.fees = add(asset.fees, record.fee_applied)?;
        asset.taxable_gain = add(asset.taxable_gain, record.taxable_gain)?;

        let year = self.year_entry(record.financial_year);
        year.acquisition_value = add(year.acquisition_value, record.acquisition_value)?;
        year.disposal_value = add(year.disposal_value, record.disposal_value)?;
        year.fees = add(year.fees, record.fee_applied)?;
        year.gross_gain = add(year.gross_gain, record.gross_gain)?;
        year.taxable_gain = add(year.taxable_gain, record.taxable_gain)?;
        Ok(())
    }

    /// Bucket for a year, seeded once with the previous year's loss
    fn year_entry(&mut self, year: FinancialYear) -> &mut FinancialYearTotals {
        if !self.years.contains_key(&year) {
            let carried_forward = self
                .years
                .get(&year.previous())
                .map(|previous| previous.taxable_gain)
                .filter(|gain| gain.is_sign_negative() && !gain.is_zero())
                .unwrap_or_default();
            if !carried_forward.is_zero() {
                log::info!("Carrying forward loss of {} into {}", carried_forward, year);
            }
            self.years.insert(
                year,
                FinancialYearTotals {
                    taxable_gain: carried_forward,
                    carried_forward,
                    ..Default::default()
                },
            );
        }
        self.years.entry(year).or_default()
    }

    pub fn assets(&self) -> &BTreeMap<Asset, AssetTotals> {
        &self.assets
    }

    pub fn years(&self) -> &BTreeMap<FinancialYear, FinancialYearTotals> {
        &self.years
    }

    #[cfg(test)]
    pub fn year(&self, year: FinancialYear) -> Option<&FinancialYearTotals> {
        self.years.get(&year)
    }
}
