use chrono::Datelike;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::models::{AggregateRecord, DividendRecord};

/// Reconcile pooled records from both sources into per-(symbol, year)
/// totals. Grouping is order-independent and rounding happens once on the
/// final sum, so the same input multiset always yields the same output.
pub fn aggregate(records: &[DividendRecord]) -> Vec<AggregateRecord> {
    let mut totals: BTreeMap<(String, i32), Decimal> = BTreeMap::new();

    for record in records {
        let key = (record.symbol.clone(), record.ex_date.year());
        *totals.entry(key).or_insert(Decimal::ZERO) += record.amount;
    }

    totals
        .into_iter()
        .map(|((symbol, year), total)| AggregateRecord {
            symbol,
            year,
            dividend: total.round_dp(2),
            remark: annual_remark(year),
        })
        .collect()
}

/// Localized remark attached to every annual total.
fn annual_remark(year: i32) -> String {
    format!("ข้อมูลผลตอบแทนเงินปันผลประจำปี {year}")
}
