//! Summary command - financial year and asset totals, balances and action audit

use crate::cmd::{format_aud, format_aud_signed, format_units, read_ledger, DEFAULT_LEDGER};
use crate::tax::precision::ArithmeticError;
use crate::tax::totals::Totals;
use crate::tax::{calculate, Action, FinancialYear, TaxReport};
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct SummaryCommand {
    /// Ledger CSV file ("-" reads stdin)
    #[arg(default_value = DEFAULT_LEDGER)]
    file: PathBuf,

    /// Financial year to report (e.g., 2021 for 2021/22)
    #[arg(short, long)]
    year: Option<i32>,

    /// Filter by asset (e.g., BTC, ETH)
    #[arg(short, long)]
    asset: Option<String>,

    /// Output as JSON instead of formatted tables
    #[arg(long)]
    json: bool,
}

/// Output of `summary --json`
#[derive(Debug, Serialize, JsonSchema)]
pub struct SummaryOutput {
    /// Selected financial year, or "All Years"
    pub financial_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub years: Vec<YearSummary>,
    pub assets: Vec<AssetSummary>,
    pub balances: Vec<BalanceSummary>,
    pub audit: Vec<AuditSummary>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct YearSummary {
    /// e.g. "2021/22"
    pub financial_year: String,
    #[schemars(with = "String")]
    pub acquisition_value: Decimal,
    #[schemars(with = "String")]
    pub disposal_value: Decimal,
    #[schemars(with = "String")]
    pub fees: Decimal,
    #[schemars(with = "String")]
    pub gross_gain: Decimal,
    /// Loss brought forward from the previous year
    #[schemars(with = "String")]
    pub carried_forward: Decimal,
    #[schemars(with = "String")]
    pub taxable_gain: Decimal,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AssetSummary {
    pub asset: String,
    #[schemars(with = "String")]
    pub acquisition_value: Decimal,
    #[schemars(with = "String")]
    pub disposal_value: Decimal,
    #[schemars(with = "String")]
    pub fees: Decimal,
    #[schemars(with = "String")]
    pub taxable_gain: Decimal,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BalanceSummary {
    pub asset: String,
    #[schemars(with = "String")]
    pub units: Decimal,
}

/// Units per action, from the ledger before matching
#[derive(Debug, Serialize, JsonSchema)]
pub struct AuditSummary {
    pub asset: String,
    #[schemars(with = "String")]
    pub buy: Decimal,
    #[schemars(with = "String")]
    pub deposit: Decimal,
    #[schemars(with = "String")]
    pub reward: Decimal,
    #[schemars(with = "String")]
    pub sell: Decimal,
    #[schemars(with = "String")]
    pub withdraw: Decimal,
    #[schemars(with = "String")]
    pub active: Decimal,
}

impl SummaryOutput {
    pub fn build(
        report: &TaxReport,
        year: Option<FinancialYear>,
        asset: Option<&str>,
    ) -> Result<Self, ArithmeticError> {
        let in_asset = |symbol: &crate::tax::Asset| asset.is_none_or(|a| symbol.matches(a));
        let totals = match asset {
            Some(_) => Totals::from_matches(report.matches(None).filter(|m| in_asset(&m.asset)))?,
            None => report.totals.clone(),
        };

        let years = totals
            .years()
            .iter()
            .filter(|(fy, _)| year.is_none_or(|y| **fy == y))
            .map(|(fy, t)| YearSummary {
                financial_year: fy.display(),
                acquisition_value: t.acquisition_value.normalize(),
                disposal_value: t.disposal_value.normalize(),
                fees: t.fees.normalize(),
                gross_gain: t.gross_gain.normalize(),
                carried_forward: t.carried_forward.normalize(),
                taxable_gain: t.taxable_gain.normalize(),
            })
            .collect();

        // Per-asset totals follow the year filter
        let asset_totals = match year {
            Some(_) => Totals::from_matches(
                report
                    .matches(year)
                    .filter(|m| in_asset(&m.asset)),
            )?,
            None => totals,
        };
        let assets = asset_totals
            .assets()
            .iter()
            .map(|(symbol, t)| AssetSummary {
                asset: symbol.to_string(),
                acquisition_value: t.acquisition_value.normalize(),
                disposal_value: t.disposal_value.normalize(),
                fees: t.fees.normalize(),
                taxable_gain: t.taxable_gain.normalize(),
            })
            .collect();

        let balances = report
            .outcome
            .balances
            .iter()
            .filter(|(symbol, _)| in_asset(symbol))
            .map(|(symbol, units)| BalanceSummary {
                asset: symbol.to_string(),
                units: units.normalize(),
            })
            .collect();

        let audit = report
            .audit
            .iter()
            .filter(|(symbol, _)| in_asset(symbol))
            .map(|(symbol, a)| AuditSummary {
                asset: symbol.to_string(),
                buy: a.units(Action::Buy).normalize(),
                deposit: a.units(Action::Deposit).normalize(),
                reward: a.units(Action::Reward).normalize(),
                sell: a.units(Action::Sell).normalize(),
                withdraw: a.units(Action::Withdraw).normalize(),
                active: a.active.normalize(),
            })
            .collect();

        Ok(SummaryOutput {
            financial_year: year.map_or("All Years".to_string(), |y| y.display()),
            asset: asset.map(str::to_lowercase),
            years,
            assets,
            balances,
            audit,
        })
    }
}

impl SummaryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.file)?;
        let report = calculate(ledger)
            .with_context(|| format!("Failed to calculate gains for {}", self.file.display()))?;
        let year = self.year.map(FinancialYear);
        let summary = SummaryOutput::build(&report, year, self.asset.as_deref())?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Tabled)]
struct YearRow {
    #[tabled(rename = "Financial Year")]
    year: String,
    #[tabled(rename = "Purchased")]
    acquisition_value: String,
    #[tabled(rename = "Sold")]
    disposal_value: String,
    #[tabled(rename = "Fees")]
    fees: String,
    #[tabled(rename = "Gross Profit")]
    gross_gain: String,
    #[tabled(rename = "Loss Brought Forward")]
    carried_forward: String,
    #[tabled(rename = "Taxable")]
    taxable_gain: String,
}

#[derive(Debug, Clone, Tabled)]
struct AssetRow {
    #[tabled(rename = "Coin")]
    asset: String,
    #[tabled(rename = "Purchased")]
    acquisition_value: String,
    #[tabled(rename = "Sold")]
    disposal_value: String,
    #[tabled(rename = "Fees")]
    fees: String,
    #[tabled(rename = "Taxable")]
    taxable_gain: String,
}

#[derive(Debug, Clone, Tabled)]
struct BalanceRow {
    #[tabled(rename = "Coin")]
    asset: String,
    #[tabled(rename = "Units Held")]
    units: String,
}

#[derive(Debug, Clone, Tabled)]
struct AuditRow {
    #[tabled(rename = "Coin")]
    asset: String,
    #[tabled(rename = "Buy")]
    buy: String,
    #[tabled(rename = "Deposit")]
    deposit: String,
    #[tabled(rename = "Reward")]
    reward: String,
    #[tabled(rename = "Sell")]
    sell: String,
    #[tabled(rename = "Withdraw")]
    withdraw: String,
    #[tabled(rename = "Active")]
    active: String,
}

fn print_summary(summary: &SummaryOutput) {
    println!();
    match &summary.asset {
        Some(asset) => println!("TAX SUMMARY ({}, {})", summary.financial_year, asset.to_uppercase()),
        None => println!("TAX SUMMARY ({})", summary.financial_year),
    }
    println!();

    print_years(&summary.years);

    if !summary.assets.is_empty() {
        println!("PER COIN");
        let rows = summary.assets.iter().map(|a| AssetRow {
            asset: a.asset.clone(),
            acquisition_value: format_aud(a.acquisition_value),
            disposal_value: format_aud(a.disposal_value),
            fees: format_aud(a.fees),
            taxable_gain: format_aud_signed(a.taxable_gain),
        });
        print_table(rows);
    }

    print_balances(&summary.balances);

    if !summary.audit.is_empty() {
        println!("ACTION AUDIT");
        let rows = summary.audit.iter().map(|a| AuditRow {
            asset: a.asset.clone(),
            buy: format_units(a.buy),
            deposit: format_units(a.deposit),
            reward: format_units(a.reward),
            sell: format_units(a.sell),
            withdraw: format_units(a.withdraw),
            active: format_units(a.active),
        });
        print_table(rows);
    }
}

pub(crate) fn print_years(years: &[YearSummary]) {
    if years.is_empty() {
        println!("No disposals found");
        println!();
        return;
    }

    println!("FINANCIAL YEARS");
    let rows = years.iter().map(|y| YearRow {
        year: y.financial_year.clone(),
        acquisition_value: format_aud(y.acquisition_value),
        disposal_value: format_aud(y.disposal_value),
        fees: format_aud(y.fees),
        gross_gain: format_aud_signed(y.gross_gain),
        carried_forward: format_aud_signed(y.carried_forward),
        taxable_gain: format_aud_signed(y.taxable_gain),
    });
    print_table(rows);
}

pub(crate) fn print_balances(balances: &[BalanceSummary]) {
    if balances.is_empty() {
        return;
    }

    println!("CURRENT BALANCES");
    let rows = balances.iter().map(|b| BalanceRow {
        asset: b.asset.clone(),
        units: format_units(b.units),
    });
    print_table(rows);
}

fn print_table<T: Tabled>(rows: impl IntoIterator<Item = T>) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
    println!();
}
