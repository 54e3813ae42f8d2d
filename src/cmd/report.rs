//! Report command - write the per-match tax report CSV

use crate::cmd::summary::{print_balances, print_years, SummaryOutput};
use crate::cmd::{read_ledger, DEFAULT_LEDGER};
use crate::tax::{calculate, FinancialYear};
use anyhow::Context;
use clap::Args;
use std::io::{self, Write};
use std::path::PathBuf;

/// Default location of the report CSV
pub const DEFAULT_REPORT: &str = "data/tax-report.csv";

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// Ledger CSV file ("-" reads stdin)
    #[arg(default_value = DEFAULT_LEDGER)]
    file: PathBuf,

    /// Report CSV destination ("-" writes to stdout)
    #[arg(short, long, default_value = DEFAULT_REPORT)]
    output: PathBuf,

    /// Only include disposals in this financial year (e.g., 2021 for 2021/22)
    #[arg(short, long)]
    year: Option<i32>,
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.file)?;
        let report = calculate(ledger)
            .with_context(|| format!("Failed to calculate gains for {}", self.file.display()))?;
        let year = self.year.map(FinancialYear);

        // Render fully before touching the destination
        let mut csv = Vec::new();
        report.write_csv(&mut csv, year)?;

        let warnings = report.warnings().count();
        if warnings > 0 {
            log::warn!("{} warning(s) raised; run `fifotax validate` for details", warnings);
        }

        if self.output.as_os_str() == "-" {
            io::stdout().write_all(&csv)?;
            return Ok(());
        }

        std::fs::write(&self.output, &csv)
            .with_context(|| format!("Failed to write report {}", self.output.display()))?;
        log::info!("Wrote {}", self.output.display());

        let summary = SummaryOutput::build(&report, year, None)?;
        println!();
        println!("Report written to {}", self.output.display());
        println!();
        print_years(&summary.years);
        print_balances(&summary.balances);
        Ok(())
    }
}
