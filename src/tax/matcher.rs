//! FIFO lot matching and gain realization.
//!
//! Each disposal consumes the earliest open acquisitions of the same asset that
//! were made at or before the disposal. Transactions are never mutated while
//! matching; progress lives in a [`LotCursor`] per transaction.

use super::balance::Balances;
use super::financial_year::FinancialYear;
use super::ledger::Ledger;
use super::precision::{add, mul, sub, ArithmeticError};
use super::transaction::{Asset, Kind, Transaction, TxId};
use super::warnings::Warning;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::ops::Range;

/// Lots held for longer than this many months qualify for the discount
pub const LONG_TERM_MONTHS: i32 = 12;

/// Share of a long-term gain that remains taxable
pub const LONG_TERM_DISCOUNT: Decimal = dec!(0.5);

/// Units of one acquisition matched against one disposal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub asset: Asset,
    pub acquisition: TxId,
    /// `None` for notional disposals (breakeven)
    pub disposal: Option<TxId>,
    pub acquisition_date: DateTime<Utc>,
    pub disposal_date: DateTime<Utc>,
    pub units: Decimal,
    pub acquisition_unit_price: Decimal,
    pub disposal_unit_price: Decimal,
    pub acquisition_value: Decimal,
    pub disposal_value: Decimal,
    pub gross_gain: Decimal,
    pub fee_applied: Decimal,
    pub long_term_discount: bool,
    pub taxable_gain: Decimal,
    pub financial_year: FinancialYear,
}

/// Matching progress of one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LotCursor {
    pub units_matched: Decimal,
    pub fee_consumed: bool,
    /// Disposal value realized against this lot
    pub disposal_value: Decimal,
    /// Taxable gain realized against this lot
    pub taxable_gain: Decimal,
    /// Indices into the match list, in production order
    pub history: Vec<usize>,
}

/// Units still to be matched for one disposal
#[derive(Debug, Clone)]
pub struct Order<'a> {
    pub source: Option<TxId>,
    pub asset: &'a Asset,
    pub timestamp: DateTime<Utc>,
    pub units: Decimal,
    pub unit_price: Decimal,
    pub units_matched: Decimal,
    /// Fee not yet charged against a match
    pub fee: Decimal,
}

impl<'a> Order<'a> {
    /// A disposal order resuming from its cursor
    fn from_disposal(disposal: &'a Transaction, cursor: &LotCursor) -> Self {
        Order {
            source: Some(disposal.id),
            asset: &disposal.asset,
            timestamp: disposal.timestamp,
            units: disposal.units,
            unit_price: disposal.unit_price,
            units_matched: cursor.units_matched,
            fee: if cursor.fee_consumed {
                Decimal::ZERO
            } else {
                disposal.fee
            },
        }
    }

    /// A disposal that exists only for diagnostics
    pub fn notional(asset: &'a Asset, timestamp: DateTime<Utc>, units: Decimal, unit_price: Decimal) -> Self {
        Order {
            source: None,
            asset,
            timestamp,
            units,
            unit_price,
            units_matched: Decimal::ZERO,
            fee: Decimal::ZERO,
        }
    }

    pub fn remaining(&self) -> Result<Decimal, ArithmeticError> {
        sub(self.units, self.units_matched)
    }

    pub fn is_filled(&self) -> bool {
        self.units_matched == self.units
    }
}

/// Cursor per ledger transaction plus every match produced so far
#[derive(Debug, Clone, Default)]
pub struct LotBook {
    cursors: Vec<LotCursor>,
    matches: Vec<MatchRecord>,
}

impl LotBook {
    pub fn new(ledger: &Ledger) -> Self {
        LotBook {
            cursors: vec![LotCursor::default(); ledger.len()],
            matches: Vec::new(),
        }
    }

    pub fn cursor(&self, id: TxId) -> &LotCursor {
        &self.cursors[id.0]
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    fn is_consumed(&self, lot: &Transaction) -> bool {
        self.cursor(lot.id).units_matched == lot.units
    }

    /// Consume open lots, oldest first, until the order is filled or no eligible lot
    /// remains. Returns the range of matches produced.
    pub fn fill(
        &mut self,
        ledger: &Ledger,
        order: &mut Order,
    ) -> Result<Range<usize>, ArithmeticError> {
        let start = self.matches.len();
        if order.is_filled() {
            return Ok(start..start);
        }

        for lot in ledger.lots(order.asset) {
            if lot.timestamp > order.timestamp || self.is_consumed(lot) {
                continue;
            }

            let record = self.match_lot(lot, order)?;
            log::debug!(
                "Matched {} {} bought {} at {} against disposal {} at {}: gross {}, fee {}, taxable {}{}",
                record.units,
                record.asset,
                record.acquisition_date.date_naive(),
                record.acquisition_unit_price,
                record.disposal_date.date_naive(),
                record.disposal_unit_price,
                record.gross_gain,
                record.fee_applied,
                record.taxable_gain,
                if record.long_term_discount { " (discounted)" } else { "" },
            );

            let index = self.matches.len();
            let cursor = &mut self.cursors[lot.id.0];
            cursor.disposal_value = add(cursor.disposal_value, record.disposal_value)?;
            cursor.units_matched = add(cursor.units_matched, record.units)?;
            cursor.taxable_gain = add(cursor.taxable_gain, record.taxable_gain)?;
            cursor.history.push(index);
            order.units_matched = add(order.units_matched, record.units)?;
            self.matches.push(record);

            if order.is_filled() {
                break;
            }
        }

        Ok(start..self.matches.len())
    }

    fn match_lot(
        &mut self,
        lot: &Transaction,
        order: &mut Order,
    ) -> Result<MatchRecord, ArithmeticError> {
        let lot_remaining = sub(lot.units, self.cursor(lot.id).units_matched)?;
        let units = lot_remaining.min(order.remaining()?);

        let acquisition_value = mul(units, lot.unit_price)?;
        let disposal_value = mul(units, order.unit_price)?;
        let gross_gain = sub(disposal_value, acquisition_value)?;

        // Each fee is charged once, against the first match touching its transaction
        let fee_applied = add(self.take_fee(lot), std::mem::take(&mut order.fee))?;

        let long_term_discount = holding_months(lot.timestamp, order.timestamp) > LONG_TERM_MONTHS
            && gross_gain > Decimal::ZERO;
        let discounted = if long_term_discount {
            mul(gross_gain, LONG_TERM_DISCOUNT)?
        } else {
            gross_gain
        };
        let taxable_gain = sub(discounted, fee_applied)?;

        Ok(MatchRecord {
            asset: lot.asset.clone(),
            acquisition: lot.id,
            disposal: order.source,
            acquisition_date: lot.timestamp,
            disposal_date: order.timestamp,
            units,
            acquisition_unit_price: lot.unit_price,
            disposal_unit_price: order.unit_price,
            acquisition_value,
            disposal_value,
            gross_gain,
            fee_applied,
            long_term_discount,
            taxable_gain,
            financial_year: FinancialYear::from_datetime(order.timestamp),
        })
    }

    fn take_fee(&mut self, lot: &Transaction) -> Decimal {
        let cursor = &mut self.cursors[lot.id.0];
        if cursor.fee_consumed {
            Decimal::ZERO
        } else {
            cursor.fee_consumed = true;
            lot.fee
        }
    }

    fn settle(&mut self, disposal: &Transaction, order: &Order) {
        let cursor = &mut self.cursors[disposal.id.0];
        cursor.units_matched = order.units_matched;
        if order.fee.is_zero() {
            cursor.fee_consumed = true;
        }
    }
}

/// Whole calendar months between two dates, ignoring the day of month
pub fn holding_months(from: DateTime<Utc>, to: DateTime<Utc>) -> i32 {
    (to.month() as i32 - from.month() as i32) + 12 * (to.year() - from.year())
}

/// Result of matching every disposal in a ledger
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub book: LotBook,
    pub balances: Balances,
    pub warnings: Vec<Warning>,
}

impl MatchOutcome {
    pub fn matches(&self) -> &[MatchRecord] {
        self.book.matches()
    }

    /// Matches that consumed units of an acquisition, in production order
    #[cfg(test)]
    pub fn history(&self, acquisition: TxId) -> impl Iterator<Item = &MatchRecord> {
        self.book
            .cursor(acquisition)
            .history
            .iter()
            .map(|index| &self.book.matches()[*index])
    }

    #[cfg(test)]
    pub fn units_matched(&self, id: TxId) -> Decimal {
        self.book.cursor(id).units_matched
    }
}

/// Match every disposal in supplied order against the ledger's lots
pub fn match_disposals(ledger: &Ledger) -> Result<MatchOutcome, ArithmeticError> {
    let mut book = LotBook::new(ledger);
    let mut balances = Balances::opening(ledger)?;
    let mut warnings = Vec::new();

    for disposal in ledger.outgoing() {
        if disposal.kind() == Kind::RelocationOut {
            balances.debit(&disposal.asset, disposal.units)?;
            continue;
        }

        let mut order = Order::from_disposal(disposal, book.cursor(disposal.id));
        let produced = book.fill(ledger, &mut order).inspect_err(|e| {
            log::error!(
                "Disposal of {} {} on {} cannot be matched: {}",
                disposal.units,
                disposal.asset,
                disposal.timestamp.date_naive(),
                e
            )
        })?;
        book.settle(disposal, &order);

        for record in &book.matches()[produced] {
            balances.debit(&record.asset, record.units)?;
        }

        if !order.is_filled() {
            log::warn!(
                "Disposal of {} {} on {} matched only {} units against earlier acquisitions",
                disposal.units,
                disposal.asset,
                disposal.timestamp.date_naive(),
                order.units_matched
            );
            warnings.push(Warning::UnmatchedDisposal {
                asset: disposal.asset.clone(),
                timestamp: disposal.timestamp,
                units: disposal.units,
                units_matched: order.units_matched,
            });
        }
    }

    for (asset, units) in balances.negative() {
        log::warn!("Balance of {} is negative: {}", asset, units);
        warnings.push(Warning::NegativeBalance {
            asset: asset.clone(),
            units,
        });
    }

    Ok(MatchOutcome {
        book,
        balances,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::ledger::read_csv;
    use chrono::TimeZone;

    fn ledger(csv_data: &str) -> Ledger {
        read_csv(csv_data.as_bytes()).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn long_term_gain_is_discounted() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,1.0,100
2022-03-01,X,sell,1.0,150",
        );
        let outcome = match_disposals(&ledger).unwrap();

        assert_eq!(outcome.matches().len(), 1);
        let m = &outcome.matches()[0];
        assert_eq!(m.acquisition_value, dec!(100));
        assert_eq!(m.disposal_value, dec!(150));
        assert_eq!(m.gross_gain, dec!(50));
        assert!(m.long_term_discount);
        assert_eq!(m.fee_applied, Decimal::ZERO);
        assert_eq!(m.taxable_gain, dec!(25));
        assert_eq!(m.financial_year, FinancialYear(2021));
    }

    #[test]
    fn fees_reduce_taxable_gain() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,1.0,100,B
2021-01-01,X,fee,,2,B
2022-03-01,X,sell,1.0,150,S
2022-03-01,X,fee,,3,S",
        );
        let outcome = match_disposals(&ledger).unwrap();

        let m = &outcome.matches()[0];
        assert_eq!(m.fee_applied, dec!(5));
        assert_eq!(m.taxable_gain, dec!(20));
    }

    #[test]
    fn partial_fills_consume_one_lot() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,2.0,10
2021-02-01,X,sell,1.0,12
2021-03-01,X,sell,1.0,15",
        );
        let outcome = match_disposals(&ledger).unwrap();

        let matches = outcome.matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].gross_gain, dec!(2));
        assert_eq!(matches[0].taxable_gain, dec!(2));
        assert!(!matches[0].long_term_discount);
        assert_eq!(matches[1].gross_gain, dec!(5));
        assert_eq!(matches[1].taxable_gain, dec!(5));

        let history: Vec<_> = outcome.history(TxId(0)).collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].disposal, Some(TxId(1)));
        assert_eq!(history[1].disposal, Some(TxId(2)));
        assert_eq!(outcome.units_matched(TxId(0)), dec!(2));

        let cursor = outcome.book.cursor(TxId(0));
        assert_eq!(cursor.disposal_value, dec!(27));
        assert_eq!(cursor.taxable_gain, dec!(7));
    }

    #[test]
    fn disposal_spans_lots_in_fifo_order() {
        let ledger = ledger(
            "\
2021-01-01,btc,buy,0.3,100
2021-02-01,btc,buy,0.3,200
2021-03-01,btc,buy,0.3,300
2021-04-01,btc,sell,0.7,400",
        );
        let outcome = match_disposals(&ledger).unwrap();

        let matches = outcome.matches();
        assert_eq!(matches.len(), 3);
        let units: Vec<_> = matches.iter().map(|m| m.units).collect();
        assert_eq!(units, vec![dec!(0.3), dec!(0.3), dec!(0.1)]);
        assert!(matches
            .windows(2)
            .all(|w| w[0].acquisition_date <= w[1].acquisition_date));
        // 0.3*300 + 0.3*200 + 0.1*100
        let gross: Decimal = matches.iter().map(|m| m.gross_gain).sum();
        assert_eq!(gross, dec!(160));
        assert_eq!(outcome.units_matched(TxId(2)), dec!(0.1));
        assert_eq!(outcome.units_matched(TxId(3)), dec!(0.7));
    }

    #[test]
    fn discount_boundary_at_twelve_months() {
        let ledger = ledger(
            "\
2021-01-15,X,buy,1,100
2021-02-15,X,buy,1,100
2021-03-15,X,buy,1,200
2022-01-01,X,sell,1,150
2022-03-31,X,sell,1,150
2022-04-01,X,sell,1,150",
        );
        let outcome = match_disposals(&ledger).unwrap();
        let matches = outcome.matches();

        // 12 months: no discount
        assert_eq!(holding_months(matches[0].acquisition_date, matches[0].disposal_date), 12);
        assert!(!matches[0].long_term_discount);
        assert_eq!(matches[0].taxable_gain, dec!(50));

        // 13 months with a gain: discounted
        assert_eq!(holding_months(matches[1].acquisition_date, matches[1].disposal_date), 13);
        assert!(matches[1].long_term_discount);
        assert_eq!(matches[1].taxable_gain, dec!(25));

        // 13 months with a loss: no discount
        assert_eq!(holding_months(matches[2].acquisition_date, matches[2].disposal_date), 13);
        assert!(!matches[2].long_term_discount);
        assert_eq!(matches[2].taxable_gain, dec!(-50));
    }

    #[test]
    fn holding_months_ignores_days() {
        assert_eq!(holding_months(utc(2021, 1, 31), utc(2022, 2, 1)), 13);
        assert_eq!(holding_months(utc(2021, 12, 1), utc(2022, 1, 31)), 1);
        assert_eq!(holding_months(utc(2021, 5, 1), utc(2021, 5, 31)), 0);
    }

    #[test]
    fn zero_cost_basis_reward() {
        let ledger = ledger(
            "\
2021-01-01,dot,reward,5,
2021-06-01,dot,sell,5,30.5",
        );
        let outcome = match_disposals(&ledger).unwrap();

        let m = &outcome.matches()[0];
        assert_eq!(m.acquisition_value, Decimal::ZERO);
        assert_eq!(m.gross_gain, m.disposal_value);
        assert_eq!(m.gross_gain, dec!(152.5));
    }

    #[test]
    fn fee_applied_once_across_partial_matches() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,2,10,B
2021-01-01,X,fee,,4,B
2021-02-01,X,sell,1,12,S1
2021-02-01,X,fee,,1,S1
2021-03-01,X,sell,1,15,S2",
        );
        let outcome = match_disposals(&ledger).unwrap();
        let matches = outcome.matches();

        assert_eq!(matches[0].fee_applied, dec!(5));
        assert_eq!(matches[0].taxable_gain, dec!(-3));
        assert_eq!(matches[1].fee_applied, Decimal::ZERO);
        assert_eq!(matches[1].taxable_gain, dec!(5));
        assert!(outcome.book.cursor(TxId(0)).fee_consumed);
        assert!(outcome.book.cursor(TxId(1)).fee_consumed);
    }

    #[test]
    fn disposal_fee_charged_to_first_lot_only() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,1,10
2021-01-02,X,buy,1,10
2021-02-01,X,sell,2,12,S
2021-02-01,X,fee,,1,S",
        );
        let outcome = match_disposals(&ledger).unwrap();
        let fees: Vec<_> = outcome.matches().iter().map(|m| m.fee_applied).collect();
        assert_eq!(fees, vec![dec!(1), Decimal::ZERO]);
    }

    #[test]
    fn lots_acquired_after_disposal_are_skipped() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,1,10
2021-03-01,X,buy,1,20
2021-02-01,X,sell,1.5,30",
        );
        let outcome = match_disposals(&ledger).unwrap();

        assert_eq!(outcome.matches().len(), 1);
        assert_eq!(outcome.matches()[0].acquisition, TxId(0));
        assert_eq!(
            outcome.warnings,
            vec![Warning::UnmatchedDisposal {
                asset: Asset::new("x"),
                timestamp: utc(2021, 2, 1),
                units: dec!(1.5),
                units_matched: dec!(1),
            }]
        );
    }

    #[test]
    fn disposal_without_acquisitions_is_reported() {
        let ledger = ledger("2021-02-01,eth,sell,1,3000");
        let outcome = match_disposals(&ledger).unwrap();

        assert!(outcome.matches().is_empty());
        assert!(matches!(
            outcome.warnings.as_slice(),
            [Warning::UnmatchedDisposal { units_matched, .. }] if units_matched.is_zero()
        ));
    }

    #[test]
    fn assets_are_matched_separately() {
        let ledger = ledger(
            "\
2021-01-01,btc,buy,1,100
2021-01-01,eth,buy,1,10
2021-02-01,ETH,sell,1,20
2021-02-01,btc,sell,1,300",
        );
        let outcome = match_disposals(&ledger).unwrap();
        let matches = outcome.matches();

        assert_eq!(matches[0].asset, Asset::new("eth"));
        assert_eq!(matches[0].gross_gain, dec!(10));
        assert_eq!(matches[1].asset, Asset::new("btc"));
        assert_eq!(matches[1].gross_gain, dec!(200));
    }

    #[test]
    fn withdrawals_reduce_balance_without_matching() {
        let ledger = ledger(
            "\
2021-01-01,btc,buy,2,100
2021-01-05,btc,withdraw,0.5,
2021-02-01,btc,sell,1,300",
        );
        let outcome = match_disposals(&ledger).unwrap();

        assert_eq!(outcome.matches().len(), 1);
        assert_eq!(outcome.units_matched(TxId(0)), dec!(1));
        assert_eq!(outcome.units_matched(TxId(1)), Decimal::ZERO);
        assert_eq!(outcome.balances.held(&Asset::new("btc")), dec!(0.5));
    }

    #[test]
    fn negative_balance_is_reported() {
        let ledger = ledger(
            "\
2021-01-01,btc,buy,1,100
2021-01-05,btc,withdraw,1.5,",
        );
        let outcome = match_disposals(&ledger).unwrap();
        assert_eq!(
            outcome.warnings,
            vec![Warning::NegativeBalance {
                asset: Asset::new("btc"),
                units: dec!(-0.5),
            }]
        );
    }

    #[test]
    fn units_matched_never_exceed_units() {
        let ledger = ledger(
            "\
2021-01-01,X,buy,0.3333333333,10
2021-01-02,X,buy,0.6666666667,10
2021-01-03,X,buy,5,10
2021-02-01,X,sell,0.1,11
2021-02-02,X,sell,0.9,12
2021-02-03,X,sell,7,13
2021-02-04,X,withdraw,1,",
        );
        let outcome = match_disposals(&ledger).unwrap();

        for tx in ledger.transactions() {
            let matched = outcome.units_matched(tx.id);
            assert!(matched >= Decimal::ZERO && matched <= tx.units, "{tx:?}");
        }

        let matched: Decimal = outcome.matches().iter().map(|m| m.units).sum();
        let acquired: Decimal = ledger.lots(&Asset::new("x")).map(|t| t.units).sum();
        assert_eq!(matched, acquired);
        assert_eq!(matched, dec!(6));
        assert_eq!(outcome.units_matched(TxId(0)), dec!(0.3333333333));
        assert_eq!(outcome.units_matched(TxId(1)), dec!(0.6666666667));
    }

    #[test]
    fn values_beyond_decimal_range_are_an_error() {
        let ledger = ledger(
            "\
2021-01-01,btc,buy,99999999999999999999,1
2021-02-01,btc,sell,99999999999999999999,9999999999",
        );
        let err = match_disposals(&ledger).unwrap_err();
        assert!(matches!(err, ArithmeticError::Overflow { op: '*', .. }), "{err:?}");
    }

    #[test]
    fn notional_order_leaves_book_untouched() {
        let ledger = ledger("2021-01-01,X,buy,2,10");
        let outcome = match_disposals(&ledger).unwrap();

        let asset = Asset::new("x");
        let mut scratch = outcome.book.clone();
        let mut order = Order::notional(&asset, utc(2023, 1, 1), dec!(2), Decimal::ZERO);
        let produced = scratch.fill(&ledger, &mut order).unwrap();

        assert_eq!(produced.len(), 1);
        assert_eq!(scratch.matches()[0].gross_gain, dec!(-20));
        assert_eq!(scratch.matches()[0].disposal, None);
        assert!(outcome.matches().is_empty());
        assert_eq!(outcome.units_matched(TxId(0)), Decimal::ZERO);
    }
}
