pub mod balance;
pub mod financial_year;
pub mod ledger;
pub mod matcher;
pub mod precision;
pub mod report;
pub mod totals;
pub mod transaction;
pub mod warnings;

pub use balance::{ActionAudit, Breakeven};
pub use financial_year::FinancialYear;
pub use ledger::{read_csv, Ledger, LedgerRow};
pub use report::{calculate, TaxReport};
pub use transaction::{Action, Asset};
pub use warnings::Warning;
