//! Performance and risk metrics (spec §4.4 "Performance & risk metrics").
//!
//! Win rate and profit factor are computed over *closed* (realized) trades
//! only — resolving the spec's open question about `fillRate` status
//! filtering the same way: a trade that never closed has no realized
//! outcome to score, so counting it toward win rate would silently dilute
//! the metric with noise rather than signal.

use crate::analytics::position::{ClosedTrade, Position};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub win_count: usize,
    pub win_rate: Decimal,
    pub profit_factor: Option<Decimal>,
}

pub fn performance_metrics(trades: &[&ClosedTrade]) -> PerformanceMetrics {
    let trade_count = trades.len();
    if trade_count == 0 {
        return PerformanceMetrics::default();
    }

    let win_count = trades.iter().filter(|t| t.realized_pnl.is_sign_positive() && !t.realized_pnl.is_zero()).count();
    let win_rate = Decimal::from(win_count) * Decimal::from(100) / Decimal::from(trade_count);

    let gross_wins: Decimal = trades.iter().map(|t| t.realized_pnl).filter(|pnl| pnl.is_sign_positive()).sum();
    let gross_losses: Decimal = trades.iter().map(|t| t.realized_pnl).filter(|pnl| pnl.is_sign_negative()).sum();
    let profit_factor = if gross_losses.is_zero() { None } else { Some(gross_wins / gross_losses.abs()) };

    PerformanceMetrics { trade_count, win_count, win_rate, profit_factor }
}

/// Herfindahl concentration index over `|quantity * averagePrice|` notional
/// per position, normalized by total portfolio notional. Ranges 0 (evenly
/// spread) to 1 (single position holds everything).
pub fn concentration(positions: &[Position]) -> Decimal {
    let notionals: Vec<Decimal> = positions
        .iter()
        .filter(|p| !p.is_flat())
        .map(|p| (p.quantity * p.average_price).abs())
        .collect();
    let total: Decimal = notionals.iter().sum();
    if total.is_zero() {
        return Decimal::ZERO;
    }
    notionals.iter().map(|n| (n / total) * (n / total)).sum()
}

/// Gross notional exposure divided by account equity.
pub fn leverage(positions: &[Position], equity: Decimal) -> Option<Decimal> {
    if equity.is_zero() {
        return None;
    }
    let gross_notional: Decimal = positions.iter().map(|p| (p.quantity * p.average_price).abs()).sum();
    Some(gross_notional / equity)
}

/// Historical return-series-based risk metrics. The spec leaves these as
/// TODO stubs pending a return-series feed this core doesn't yet maintain
/// (spec §4.4: "drawdown, Sharpe left as TODO stubs ... VaR95/99 likewise").
#[derive(Debug, Clone, Default)]
pub struct ReturnSeriesMetrics {
    pub max_drawdown: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub var_95: Option<Decimal>,
    pub var_99: Option<Decimal>,
}

// TODO: populate ReturnSeriesMetrics once a per-user daily-return series is
// tracked; until then every field reports None rather than a fabricated 0.
pub fn return_series_metrics(_daily_returns: &[Decimal]) -> ReturnSeriesMetrics {
    ReturnSeriesMetrics::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::money::CurrencyPair;
    use crate::core::order::Side;
    use rust_decimal_macros::dec;
    use std::time::SystemTime;

    fn closed(pnl: Decimal) -> ClosedTrade {
        ClosedTrade { quantity: dec!(1), entry_price: dec!(1), exit_price: dec!(1), realized_pnl: pnl, closed_at: SystemTime::now() }
    }

    #[test]
    fn win_rate_and_profit_factor_only_count_closed_trades() {
        let trades = vec![closed(dec!(100)), closed(dec!(-40)), closed(dec!(60))];
        let refs: Vec<&ClosedTrade> = trades.iter().collect();
        let metrics = performance_metrics(&refs);
        assert_eq!(metrics.trade_count, 3);
        assert_eq!(metrics.win_count, 2);
        assert!((metrics.win_rate - dec!(66.6667)).abs() < dec!(0.001));
        assert_eq!(metrics.profit_factor, Some(dec!(4)));
    }

    #[test]
    fn no_trades_yields_defaults_not_a_panic() {
        let metrics = performance_metrics(&[]);
        assert_eq!(metrics.trade_count, 0);
        assert_eq!(metrics.profit_factor, None);
    }

    #[test]
    fn single_position_has_maximal_concentration() {
        let mut position = Position::new("u1".into(), CurrencyPair::new("EUR", "USD"));
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1), SystemTime::now());
        assert_eq!(concentration(&[position]), dec!(1));
    }

    #[test]
    fn evenly_split_positions_have_lower_concentration() {
        let mut a = Position::new("u1".into(), CurrencyPair::new("EUR", "USD"));
        a.apply_fill(Side::Buy, dec!(10_000), dec!(1.0), SystemTime::now());
        let mut b = Position::new("u1".into(), CurrencyPair::new("GBP", "USD"));
        b.apply_fill(Side::Buy, dec!(10_000), dec!(1.0), SystemTime::now());
        assert_eq!(concentration(&[a, b]), dec!(0.5));
    }

    #[test]
    fn return_series_metrics_are_todo_stubs() {
        let metrics = return_series_metrics(&[dec!(0.01), dec!(-0.02)]);
        assert!(metrics.max_drawdown.is_none());
        assert!(metrics.sharpe_ratio.is_none());
    }
}
