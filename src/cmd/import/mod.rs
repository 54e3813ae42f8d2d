pub mod btc_markets;

use crate::cmd::format_units;
use crate::tax::{Action, ActionAudit};
use anyhow::Context;
use clap::{Args, Subcommand};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

/// Convert an exchange export into ledger rows
#[derive(Args, Debug)]
pub struct ImportCommand {
    #[command(subcommand)]
    sub: ImportSubCommand,
}

impl ImportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        self.sub.exec()
    }
}

#[derive(Subcommand, Debug)]
pub enum ImportSubCommand {
    /// BTC Markets transaction export
    BtcMarkets(ImportCsvCommand),
}

impl ImportSubCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self {
            Self::BtcMarkets(csv) => csv.exec(),
        }
    }
}

#[derive(Args, Debug)]
pub struct ImportCsvCommand {
    /// The exported csv file
    file: PathBuf,

    /// Ledger CSV destination ("-" writes to stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,
}

impl ImportCsvCommand {
    fn exec(&self) -> anyhow::Result<()> {
        let file = File::open(&self.file)
            .with_context(|| format!("Failed to open {}", self.file.display()))?;
        let transposed = btc_markets::transpose(BufReader::new(file))
            .with_context(|| format!("Failed to import {}", self.file.display()))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in &transposed.rows {
            wtr.serialize(row)?;
        }
        let data = wtr.into_inner().context("Failed to render ledger rows")?;

        if self.output.as_os_str() == "-" {
            io::stdout().write_all(&data)?;
        } else {
            std::fs::write(&self.output, &data)
                .with_context(|| format!("Failed to write {}", self.output.display()))?;
            log::info!("Wrote {} rows to {}", transposed.rows.len(), self.output.display());
        }

        print_audit(&transposed.audit);
        Ok(())
    }
}

#[derive(Debug, Clone, Tabled)]
struct AuditRow {
    #[tabled(rename = "Coin")]
    asset: String,
    #[tabled(rename = "Buy")]
    buy: String,
    #[tabled(rename = "Sell")]
    sell: String,
    #[tabled(rename = "Withdraw")]
    withdraw: String,
    #[tabled(rename = "Deposit")]
    deposit: String,
    #[tabled(rename = "Active")]
    active: String,
}

/// Printed to stderr so stdout stays a clean ledger
fn print_audit(audit: &ActionAudit) {
    if audit.is_empty() {
        return;
    }
    let rows: Vec<AuditRow> = audit
        .iter()
        .map(|(asset, a)| AuditRow {
            asset: asset.to_string(),
            buy: format_units(a.units(Action::Buy)),
            sell: format_units(a.units(Action::Sell)),
            withdraw: format_units(a.units(Action::Withdraw)),
            deposit: format_units(a.units(Action::Deposit)),
            active: format_units(a.active),
        })
        .collect();

    eprintln!();
    eprintln!("AUDIT TOTALS");
    eprintln!("{}", Table::new(rows).with(Style::rounded()));
}
