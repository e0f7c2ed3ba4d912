//! Settlement-date arithmetic (spec §4.3 "Settlement creation").

use super::settlement::SettlementCycle;
use crate::config::SettlementConfig;
use crate::core::money::CurrencyPair;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Advances `from` by `business_days` business days, skipping weekends.
/// `business_days == 0` still snaps forward off a weekend (T+0 settling on
/// a Saturday trade settles the next Monday).
pub fn business_day_offset(from: NaiveDate, business_days: i64) -> NaiveDate {
    let mut date = from;
    let mut remaining = business_days;
    while remaining > 0 {
        date += Duration::days(1);
        if !is_weekend(date) {
            remaining -= 1;
        }
    }
    while is_weekend(date) {
        date += Duration::days(1);
    }
    date
}

/// Picks the settlement cycle for `pair`: `cycleOverrides` keyed by
/// "BASE/QUOTE" wins over `defaultSettlementCycle` (spec §4.3 "e.g., USD/CAD
/// ⇒ T+1").
pub fn select_cycle(pair: &CurrencyPair, config: &SettlementConfig) -> SettlementCycle {
    config
        .cycle_overrides
        .get(&pair.as_str())
        .and_then(|s| SettlementCycle::parse(s))
        .or_else(|| SettlementCycle::parse(&config.default_settlement_cycle))
        .unwrap_or(SettlementCycle::T2)
}
