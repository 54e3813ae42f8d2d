//! Breakeven command - price at which each held balance recovers its cost basis

use crate::cmd::{format_aud, format_units, read_ledger, DEFAULT_LEDGER};
use crate::tax::{calculate, Breakeven};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct BreakevenCommand {
    /// Ledger CSV file ("-" reads stdin)
    #[arg(default_value = DEFAULT_LEDGER)]
    file: PathBuf,

    /// Only lots acquired on or before this date count (YYYY-MM-DD, default now)
    #[arg(long, value_parser = parse_as_of)]
    as_of: Option<DateTime<Utc>>,

    /// Output as JSON instead of a formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct BreakevenOutput {
    as_of: String,
    assets: Vec<Breakeven>,
}

#[derive(Debug, Clone, Tabled)]
struct BreakevenRow {
    #[tabled(rename = "Coin")]
    asset: String,
    #[tabled(rename = "Units Held")]
    units: String,
    #[tabled(rename = "Cost Basis")]
    value: String,
    #[tabled(rename = "Breakeven Price")]
    unit_price: String,
}

impl BreakevenCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.file)?;
        let report = calculate(ledger)
            .with_context(|| format!("Failed to calculate gains for {}", self.file.display()))?;
        let as_of = self.as_of.unwrap_or_else(Utc::now);
        let results = report.breakeven(as_of)?;

        if self.json {
            let output = BreakevenOutput {
                as_of: as_of.to_rfc3339(),
                assets: results,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No held balances with a remaining cost basis");
            return Ok(());
        }

        let rows: Vec<BreakevenRow> = results
            .iter()
            .map(|b| BreakevenRow {
                asset: b.asset.to_string(),
                units: format_units(b.units),
                value: format_aud(b.value),
                unit_price: b.unit_price.map_or("-".to_string(), format_aud),
            })
            .collect();

        println!();
        println!("BREAKEVEN SALE VALUE (as of {})", as_of.date_naive());
        println!();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        Ok(())
    }
}

/// End of the given day, so lots bought that day are included
fn parse_as_of(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}
