//! Validate command - surface data quality issues without writing a report

use crate::cmd::{format_units, read_ledger, DEFAULT_LEDGER};
use crate::tax::precision;
use crate::tax::transaction::format_timestamp;
use crate::tax::{calculate, Warning};
use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Ledger CSV file ("-" reads stdin)
    #[arg(default_value = DEFAULT_LEDGER)]
    file: PathBuf,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// A validation issue for output
#[derive(Debug, Clone, Serialize)]
struct ValidationIssue {
    #[serde(rename = "issue")]
    issue_type: &'static str,
    message: String,
    #[serde(flatten)]
    warning: Warning,
}

#[derive(Debug, Serialize)]
struct ValidationOutput {
    issue_count: usize,
    issues: Vec<ValidationIssue>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.file)?;
        let report = calculate(ledger)
            .with_context(|| format!("Failed to calculate gains for {}", self.file.display()))?;

        let issues: Vec<ValidationIssue> = report
            .warnings()
            .map(|w| ValidationIssue {
                issue_type: w.name(),
                message: warning_message(w),
                warning: w.clone(),
            })
            .collect();

        if self.json {
            let output = ValidationOutput {
                issue_count: issues.len(),
                issues: issues.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&issues);
        }

        // Exit with code 1 if issues found
        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(issues: &[ValidationIssue]) {
    println!();
    println!("VALIDATION RESULTS");
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }

    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        println!("  {}. [{}] {}", i + 1, issue.issue_type, issue.message);
    }
    println!();
}

fn warning_message(warning: &Warning) -> String {
    match warning {
        Warning::UnmatchedDisposal {
            asset,
            timestamp,
            units,
            units_matched,
        } if units_matched.is_zero() => format!(
            "{} Disposal of {} {} has no earlier acquisitions to match",
            format_timestamp(*timestamp),
            format_units(*units),
            asset
        ),
        Warning::UnmatchedDisposal {
            asset,
            timestamp,
            units,
            units_matched,
        } => format!(
            "{} Disposal of {} {} matched only {} units",
            format_timestamp(*timestamp),
            format_units(*units),
            asset,
            format_units(*units_matched)
        ),
        Warning::NegativeBalance { asset, units } => {
            format!("Balance of {} is negative: {}", asset, format_units(*units))
        }
        Warning::ExcessPrecision { line, field, value } => format!(
            "Line {}: {} '{}' has more than {} decimal places and was rounded",
            line,
            field,
            value,
            precision::SCALE
        ),
    }
}
