//! P&L snapshots: the periodic mark-to-market loop over open positions
//! (spec §4.4 "P&L loop").

use crate::analytics::position::Position;
use crate::core::money::CurrencyPair;
use crate::external::rate_provider::RateProvider;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// A position's contribution to a currency's exposure total. `base_amount`
/// is `None` when the currency couldn't be converted to the reporting base
/// currency this tick (spec §4.4 "rate conversion gaps set the exposure
/// entry's baseCurrencyAmount to null").
#[derive(Debug, Clone)]
pub struct CurrencyExposure {
    pub local_amount: Decimal,
    pub base_amount: Option<Decimal>,
}

/// One position's mark for this tick. `stale` is set when the pair had no
/// fresh rate and `unrealized_pnl` is the prior tick's numeric value carried
/// forward rather than zero (spec §8 scenario 6: "marked stale=true, the
/// prior numeric value carried forward").
#[derive(Debug, Clone)]
pub struct PositionMark {
    pub unrealized_pnl: Decimal,
    pub stale: bool,
}

#[derive(Debug, Clone)]
pub struct PnLSnapshot {
    pub user_id: String,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub currency_exposure: HashMap<String, CurrencyExposure>,
    /// Per-position marks, keyed by pair ("BASE/QUOTE"), so the next tick
    /// can carry a stale position's value forward instead of zeroing it.
    pub position_marks: HashMap<String, PositionMark>,
    pub calculated_at: SystemTime,
    /// True when any position in this snapshot is a carried-forward stale
    /// mark rather than a fresh one (spec §8 scenario 6: "totalPnL flags
    /// partial=true").
    pub partial: bool,
}

/// Computes one user's snapshot from their open positions. A position whose
/// pair has no fresh rate this tick has its prior mark (from `previous`)
/// carried forward instead of being zeroed (spec §4.4's failure semantics:
/// "never replaced with zero silently"); `partial` is then set so callers
/// know the total includes a stale figure.
pub async fn calculate_snapshot(
    user_id: &str,
    positions: &[Position],
    rate_provider: &dyn RateProvider,
    base_currency: &str,
    rate_validity: Duration,
    now: SystemTime,
    previous: Option<&PnLSnapshot>,
) -> PnLSnapshot {
    let mut realized_pnl = Decimal::ZERO;
    let mut unrealized_pnl = Decimal::ZERO;
    let mut currency_exposure: HashMap<String, CurrencyExposure> = HashMap::new();
    let mut position_marks: HashMap<String, PositionMark> = HashMap::new();
    let mut partial = false;

    for position in positions {
        realized_pnl += position.realized_pnl;
        if position.is_flat() {
            continue;
        }
        let pair_key = position.pair.as_str();

        let Some(mid) = fresh_mid(rate_provider, &position.pair, rate_validity, now).await else {
            let carried = previous
                .and_then(|snapshot| snapshot.position_marks.get(&pair_key))
                .map(|mark| mark.unrealized_pnl)
                .unwrap_or(Decimal::ZERO);
            unrealized_pnl += carried;
            position_marks.insert(pair_key, PositionMark { unrealized_pnl: carried, stale: true });
            partial = true;
            continue;
        };

        let position_unrealized = position.quantity * (mid - position.average_price);
        unrealized_pnl += position_unrealized;
        position_marks.insert(pair_key, PositionMark { unrealized_pnl: position_unrealized, stale: false });

        let local_amount = position.quantity * mid;
        let base_amount = convert_to_base(rate_provider, &position.pair.base, base_currency, local_amount).await;
        let entry = currency_exposure
            .entry(position.pair.base.clone())
            .or_insert(CurrencyExposure { local_amount: Decimal::ZERO, base_amount: Some(Decimal::ZERO) });
        entry.local_amount += local_amount;
        entry.base_amount = match (entry.base_amount, base_amount) {
            (Some(acc), Some(delta)) => Some(acc + delta),
            _ => None,
        };
    }

    PnLSnapshot {
        user_id: user_id.to_string(),
        realized_pnl,
        unrealized_pnl,
        total_pnl: realized_pnl + unrealized_pnl,
        currency_exposure,
        position_marks,
        calculated_at: now,
        partial,
    }
}

async fn fresh_mid(
    rate_provider: &dyn RateProvider,
    pair: &CurrencyPair,
    rate_validity: Duration,
    now: SystemTime,
) -> Option<Decimal> {
    let rate = rate_provider.get_rate(&pair.base, &pair.quote).await?;
    let age_ok = now.duration_since(rate.timestamp).map(|age| age <= rate_validity).unwrap_or(false);
    age_ok.then_some(rate.mid())
}

async fn convert_to_base(
    rate_provider: &dyn RateProvider,
    currency: &str,
    base_currency: &str,
    amount: Decimal,
) -> Option<Decimal> {
    if currency.eq_ignore_ascii_case(base_currency) {
        return Some(amount);
    }
    let rate = rate_provider.get_rate(currency, base_currency).await?;
    Some(amount * rate.mid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::order::Side;
    use crate::external::rate_provider::InMemoryRateProvider;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn unrealized_pnl_marks_against_live_mid() {
        let provider = InMemoryRateProvider::new();
        provider.set_rate("EUR", "USD", dec!(1.1050), Decimal::ZERO);

        let mut position = Position::new("u1".into(), CurrencyPair::new("EUR", "USD"));
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1000), SystemTime::now());

        let snapshot = calculate_snapshot(
            "u1",
            &[position],
            &provider,
            "USD",
            Duration::from_secs(30),
            SystemTime::now(),
            None,
        )
        .await;

        assert_eq!(snapshot.unrealized_pnl, dec!(50.0));
        assert!(!snapshot.partial);
    }

    #[tokio::test]
    async fn missing_rate_carries_the_prior_mark_forward_and_flags_partial() {
        let provider = InMemoryRateProvider::new();
        provider.set_rate("GBP", "USD", dec!(1.26), Decimal::ZERO);

        let mut position = Position::new("u1".into(), CurrencyPair::new("GBP", "USD"));
        position.apply_fill(Side::Buy, dec!(1_000), dec!(1.25), SystemTime::now());

        let first = calculate_snapshot(
            "u1",
            &[position.clone()],
            &provider,
            "USD",
            Duration::from_secs(30),
            SystemTime::now(),
            None,
        )
        .await;
        assert_eq!(first.unrealized_pnl, dec!(10.0));
        assert!(!first.partial);

        provider.clear_rate("GBP", "USD");
        let second = calculate_snapshot(
            "u1",
            &[position],
            &provider,
            "USD",
            Duration::from_secs(30),
            SystemTime::now(),
            Some(&first),
        )
        .await;

        assert!(second.partial);
        assert_eq!(second.unrealized_pnl, dec!(10.0));
        assert!(second.position_marks.get("GBP/USD").unwrap().stale);
    }

    #[tokio::test]
    async fn missing_rate_with_no_prior_mark_carries_forward_zero() {
        let provider = InMemoryRateProvider::new();
        let mut position = Position::new("u1".into(), CurrencyPair::new("GBP", "USD"));
        position.apply_fill(Side::Buy, dec!(1_000), dec!(1.25), SystemTime::now());

        let snapshot = calculate_snapshot(
            "u1",
            &[position],
            &provider,
            "USD",
            Duration::from_secs(30),
            SystemTime::now(),
            None,
        )
        .await;

        assert!(snapshot.partial);
        assert_eq!(snapshot.unrealized_pnl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn exposure_conversion_gap_nulls_base_amount_not_the_whole_snapshot() {
        let provider = InMemoryRateProvider::new();
        provider.set_rate("EUR", "CHF", dec!(0.95), Decimal::ZERO);
        let mut position = Position::new("u1".into(), CurrencyPair::new("EUR", "CHF"));
        position.apply_fill(Side::Buy, dec!(1_000), dec!(0.94), SystemTime::now());

        let snapshot = calculate_snapshot(
            "u1",
            &[position],
            &provider,
            "USD",
            Duration::from_secs(30),
            SystemTime::now(),
            None,
        )
        .await;

        assert!(!snapshot.partial);
        let exposure = snapshot.currency_exposure.get("EUR").unwrap();
        assert!(exposure.base_amount.is_none());
    }
}
