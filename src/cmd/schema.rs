//! Schema command - print expected input and output formats

use crate::cmd::summary::SummaryOutput;
use crate::tax::LedgerRow;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: csv-header, csv-fields or json-schema
    #[arg(value_enum, default_value = "csv-fields")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// Ledger column names in file order
    CsvHeader,
    /// Ledger column descriptions
    CsvFields,
    /// JSON Schema of `summary --json`
    JsonSchema,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::CsvHeader => print_csv_header(),
            SchemaFormat::CsvFields => print_csv_fields(),
            SchemaFormat::JsonSchema => print_json_schema()?,
        }
        Ok(())
    }
}

fn print_csv_header() {
    let names: Vec<_> = LedgerRow::columns().iter().map(|c| c.name).collect();
    println!("{}", names.join(","));
}

fn print_csv_fields() {
    println!("Ledger CSV Format (no header row)");
    println!("=================================");
    println!();
    for column in LedgerRow::columns() {
        let req = match (column.required, column.nullable) {
            (true, false) => "required",
            (true, true) => "may be empty",
            (false, _) => "optional",
        };
        println!(
            "{:2} {:12} ({:12})  {}",
            column.position + 1,
            column.name,
            req,
            column.description
        );
    }
    println!();
    println!("Fee lines share timestamp, asset and reference with their transaction.");
}

fn print_json_schema() -> anyhow::Result<()> {
    let schema = schema_for!(SummaryOutput);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
