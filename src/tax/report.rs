use super::balance::{breakeven, ActionAudit, Breakeven};
use super::financial_year::FinancialYear;
use super::ledger::Ledger;
use super::matcher::{match_disposals, MatchOutcome, MatchRecord};
use super::precision::ArithmeticError;
use super::totals::Totals;
use super::transaction::format_timestamp;
use super::warnings::Warning;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// One row of the tax report CSV
#[derive(Debug, Serialize)]
pub struct MatchCsvRecord {
    #[serde(rename = "Sale Date")]
    pub sale_date: String,
    #[serde(rename = "Financial Year")]
    pub financial_year: i32,
    #[serde(rename = "Purchase Date")]
    pub purchase_date: String,
    #[serde(rename = "Coin")]
    pub coin: String,
    #[serde(rename = "Purchased Value")]
    pub purchased_value: Decimal,
    #[serde(rename = "Purchased Unit Price")]
    pub purchased_unit_price: Decimal,
    #[serde(rename = "Sale Value")]
    pub sale_value: Decimal,
    #[serde(rename = "Units Sold")]
    pub units_sold: Decimal,
    #[serde(rename = "Sale Unit Price")]
    pub sale_unit_price: Decimal,
    #[serde(rename = "Gross Profit")]
    pub gross_profit: Decimal,
    #[serde(rename = "Transaction Fees")]
    pub transaction_fees: Decimal,
    #[serde(rename = "Taxable Amount")]
    pub taxable_amount: Decimal,
    #[serde(rename = "50% CGT Discount")]
    pub cgt_discount: bool,
}

impl From<&MatchRecord> for MatchCsvRecord {
    fn from(m: &MatchRecord) -> Self {
        MatchCsvRecord {
            sale_date: format_timestamp(m.disposal_date),
            financial_year: m.financial_year.0,
            purchase_date: format_timestamp(m.acquisition_date),
            coin: m.asset.to_string(),
            purchased_value: m.acquisition_value.normalize(),
            purchased_unit_price: m.acquisition_unit_price.normalize(),
            sale_value: m.disposal_value.normalize(),
            units_sold: m.units.normalize(),
            sale_unit_price: m.disposal_unit_price.normalize(),
            gross_profit: m.gross_gain.normalize(),
            transaction_fees: m.fee_applied.normalize(),
            taxable_amount: m.taxable_gain.normalize(),
            cgt_discount: m.long_term_discount,
        }
    }
}

/// Everything one processing run produces
#[derive(Debug)]
pub struct TaxReport {
    pub ledger: Ledger,
    pub outcome: MatchOutcome,
    pub totals: Totals,
    pub audit: ActionAudit,
}

impl TaxReport {
    pub fn matches(&self, year: Option<FinancialYear>) -> impl Iterator<Item = &MatchRecord> {
        self.outcome
            .matches()
            .iter()
            .filter(move |m| year.is_none_or(|y| m.financial_year == y))
    }

    /// Ledger warnings followed by matching warnings
    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.ledger.warnings().iter().chain(&self.outcome.warnings)
    }

    pub fn breakeven(&self, as_of: DateTime<Utc>) -> Result<Vec<Breakeven>, ArithmeticError> {
        breakeven(&self.ledger, &self.outcome, as_of)
    }

    /// Write matches to CSV, in production order
    pub fn write_csv<W: Write>(&self, writer: W, year: Option<FinancialYear>) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for record in self.matches(year) {
            wtr.serialize(MatchCsvRecord::from(record))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Match every disposal and roll the results up
pub fn calculate(ledger: Ledger) -> Result<TaxReport, ArithmeticError> {
    let outcome = match_disposals(&ledger)?;
    let totals = Totals::from_matches(outcome.matches())?;
    let audit = ActionAudit::from_ledger(&ledger)?;
    log::info!(
        "Produced {} matches across {} financial years",
        outcome.matches().len(),
        totals.years().len()
    );
    Ok(TaxReport {
        ledger,
        outcome,
        totals,
        audit,
    })
}
