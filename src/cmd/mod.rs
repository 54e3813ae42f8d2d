pub mod breakeven;
pub mod import;
pub mod report;
pub mod schema;
pub mod summary;
pub mod validate;

use crate::tax::{self, Ledger};
use anyhow::Context;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Default location of the ledger file
pub const DEFAULT_LEDGER: &str = "data/crypto-data.csv";

/// Read the ledger CSV (or stdin with "-")
pub fn read_ledger(path: &Path) -> anyhow::Result<Ledger> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        io::stdin().lock().read_to_end(&mut buffer)?;
        if buffer.is_empty() {
            anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
        }
        return tax::read_csv(buffer.as_slice()).context("Failed to read ledger from stdin");
    }

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    tax::read_csv(BufReader::new(file))
        .with_context(|| format!("Failed to read ledger {}", path.display()))
}

pub fn format_aud(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

pub fn format_aud_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}

/// Units without trailing zeros
pub fn format_units(units: Decimal) -> String {
    units.normalize().to_string()
}
