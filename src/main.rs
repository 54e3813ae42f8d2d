mod cmd;
mod tax;

use clap::{Parser, Subcommand};

/// FIFO capital gains calculator for cryptocurrency disposals
#[derive(Parser, Debug)]
#[command(name = "fifotax", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match disposals and write the tax report CSV
    Report(cmd::report::ReportCommand),
    /// Financial year and per-coin totals, balances and action audit
    Summary(cmd::summary::SummaryCommand),
    /// Price at which each held balance recovers its cost basis
    Breakeven(cmd::breakeven::BreakevenCommand),
    /// List unmatched disposals, negative balances and rounded values
    Validate(cmd::validate::ValidateCommand),
    /// Describe the ledger columns or the summary JSON
    Schema(cmd::schema::SchemaCommand),
    /// Convert an exchange export into ledger rows
    Import(cmd::import::ImportCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(report) => report.exec(),
        Command::Summary(summary) => summary.exec(),
        Command::Breakeven(breakeven) => breakeven.exec(),
        Command::Validate(validate) => validate.exec(),
        Command::Schema(schema) => schema.exec(),
        Command::Import(import) => import.exec(),
    }
}
