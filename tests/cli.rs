//! E2E tests for the report, summary, breakeven, validate, schema and import commands

use std::path::PathBuf;
use std::process::{Command, Output};

const LEDGER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/crypto-data.csv");
const UNMATCHED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/unmatched.csv");
const ORPHAN_FEE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/orphan-fee.csv");
const OVERFLOW: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/overflow.csv");
const EXPORT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/btc-markets-export.csv");

fn fifotax(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fifotax"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fifotax-{}-{}", std::process::id(), name))
}

/// Test that the report CSV contains one row per match in production order
#[test]
fn report_to_stdout() {
    let output = fifotax(&["report", LEDGER, "-o", "-"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);

    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Sale Date,Financial Year,Purchase Date,Coin,Purchased Value,Purchased Unit Price,Sale Value,Units Sold,Sale Unit Price,Gross Profit,Transaction Fees,Taxable Amount,50% CGT Discount",
            "2021-03-01T00:00:00.000Z,2020,2021-02-01T00:00:00.000Z,eth,10,10,12,1,12,2,0,2,false",
            "2021-04-01T00:00:00.000Z,2020,2021-02-01T00:00:00.000Z,eth,10,10,15,1,15,5,0,5,false",
            "2022-03-01T00:00:00.000Z,2021,2021-01-01T00:00:00.000Z,btc,100,100,150,1,150,50,5,20,true",
        ]
    );
}

/// Test the report filtered to one financial year
#[test]
fn report_single_year() {
    let output = fifotax(&["report", LEDGER, "-o", "-", "--year", "2021"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert_eq!(stdout.lines().count(), 2);
    assert!(stdout.contains(",btc,"));
    assert!(!stdout.contains(",eth,"));
}

/// Test that writing to a file prints year totals and balances
#[test]
fn report_to_file() {
    let path = temp_path("report.csv");
    let output = fifotax(&["report", LEDGER, "-o", path.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("FINANCIAL YEARS"));
    assert!(stdout.contains("2020/21"));
    assert!(stdout.contains("2021/22"));
    assert!(stdout.contains("CURRENT BALANCES"));

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written.lines().count(), 4);
    std::fs::remove_file(&path).ok();
}

/// Test that an orphan fee fails the run and writes nothing
#[test]
fn orphan_fee_is_fatal() {
    let path = temp_path("orphan.csv");
    let output = fifotax(&["report", ORPHAN_FEE, "-o", path.to_str().unwrap()]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("references no transaction"), "{}", stderr);
    assert!(stderr.contains("R9"), "{}", stderr);
    assert!(!path.exists());
}

/// Test that values beyond the decimal range fail with an error instead of a panic
#[test]
fn overflow_is_reported() {
    let output = fifotax(&["report", OVERFLOW, "-o", "-"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1), "{}", stderr);
    assert!(stderr.contains("Failed to calculate gains"), "{}", stderr);
    assert!(stderr.contains("outside the decimal range"), "{}", stderr);
    assert!(output.stdout.is_empty());
}

/// Test summary JSON totals, carry-forward and balances
#[test]
fn summary_json() {
    let output = fifotax(&["summary", LEDGER, "--json"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["financial_year"], "All Years");
    assert_eq!(json["years"][0]["financial_year"], "2020/21");
    assert_eq!(json["years"][0]["taxable_gain"], "7");
    assert_eq!(json["years"][1]["financial_year"], "2021/22");
    assert_eq!(json["years"][1]["carried_forward"], "0");
    assert_eq!(json["years"][1]["taxable_gain"], "20");

    let balances = json["balances"].as_array().unwrap();
    let ada = balances.iter().find(|b| b["asset"] == "ada").unwrap();
    assert_eq!(ada["units"], "90");
    let dot = balances.iter().find(|b| b["asset"] == "dot").unwrap();
    assert_eq!(dot["units"], "5");
}

/// Test the summary tables filtered by asset
#[test]
fn summary_by_asset() {
    let output = fifotax(&["summary", LEDGER, "-a", "ETH"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("TAX SUMMARY (All Years, ETH)"));
    assert!(stdout.contains("ACTION AUDIT"));
    assert!(!stdout.contains("btc"));
}

/// Test breakeven prices for held balances
#[test]
fn breakeven_json() {
    let output = fifotax(&["breakeven", LEDGER, "--as-of", "2023-01-01", "--json"]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let assets = json["assets"].as_array().unwrap();
    // dot has a zero cost basis and is skipped
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0]["asset"], "ada");
    assert_eq!(assets[0]["value"], "45");
    assert_eq!(assets[0]["unit_price"], "0.5");
}

/// Test that a clean ledger validates
#[test]
fn validate_clean() {
    let output = fifotax(&["validate", LEDGER]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("No issues found"));
}

/// Test that unmatched disposals fail validation
#[test]
fn validate_unmatched() {
    let output = fifotax(&["validate", UNMATCHED, "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["issue_count"], 2);
    assert_eq!(json["issues"][0]["issue"], "UnmatchedDisposal");
    assert_eq!(json["issues"][0]["units_matched"], "1");
    assert_eq!(json["issues"][1]["issue"], "NoCostBasis");
    assert_eq!(json["issues"][1]["asset"], "eth");
}

/// Test the ledger column description
#[test]
fn schema_csv_header() {
    let output = fifotax(&["schema", "csv-header"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert_eq!(stdout.trim(), "timestamp,asset,action,units,unit_price,reference");
}

/// Test the BTC Markets import
#[test]
fn import_btc_markets() {
    let output = fifotax(&["import", "btc-markets", EXPORT]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec![
            "2021-01-05T10:00:00.000Z,btc,buy,0.5,40000,R1",
            "2021-01-05T10:00:00.000Z,btc,fee,,20.5,R1",
            "2021-02-01T08:00:00.000Z,btc,sell,0.2,50000,R2",
            "2021-02-01T08:00:00.000Z,btc,fee,,8.25,R2",
            "2021-02-03T08:00:00.000Z,btc,withdraw,0.1,,W1",
            "2021-02-04T08:00:00.000Z,eth,deposit,2,,D1",
        ]
    );
    assert!(stderr.contains("AUDIT TOTALS"));
}

/// Test that imported rows feed straight into a report
#[test]
fn import_then_report() {
    let ledger = temp_path("imported.csv");
    let output = fifotax(&["import", "btc-markets", EXPORT, "-o", ledger.to_str().unwrap()]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let output = fifotax(&["report", ledger.to_str().unwrap(), "-o", "-"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);
    // 0.2 * (50000 - 40000) less both fees
    assert!(
        stdout.contains(",btc,8000,40000,10000,0.2,50000,2000,28.75,1971.25,false"),
        "{}",
        stdout
    );
    std::fs::remove_file(&ledger).ok();
}
