//! Daily report generation (spec §4.4 "Daily report").

use crate::analytics::position::Position;
use crate::analytics::risk_metrics::{concentration, performance_metrics, PerformanceMetrics};
use crate::config::AnalyticsConfig;
use rust_decimal::Decimal;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct UserDailyReport {
    pub user_id: String,
    pub volume: Decimal,
    pub trade_count: usize,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub performance: PerformanceMetrics,
    pub concentration: Decimal,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DailyReport {
    pub generated_at: SystemTime,
    pub user_reports: Vec<UserDailyReport>,
    pub total_volume: Decimal,
    pub total_realized_pnl: Decimal,
}

/// Builds one user's section: volume and trade count from closed trades,
/// P&L from their live positions, alerts when VaR/concentration exceed the
/// configured thresholds (spec §4.4: "alerts when per-user VaR or
/// concentration exceeds configured thresholds"). VaR itself is a TODO
/// stub (see `risk_metrics::return_series_metrics`) so only the
/// concentration alert can fire today; the VaR branch is wired for when a
/// return series becomes available.
pub fn build_user_report(
    user_id: &str,
    positions: &[Position],
    unrealized_pnl: Decimal,
    config: &AnalyticsConfig,
) -> UserDailyReport {
    let closed_trades: Vec<_> = positions.iter().flat_map(|p| p.trades.iter()).collect();
    let volume: Decimal = closed_trades.iter().map(|t| t.quantity).sum();
    let realized_pnl: Decimal = positions.iter().map(|p| p.realized_pnl).sum();
    let performance = performance_metrics(&closed_trades);
    let position_concentration = concentration(positions);

    let mut alerts = Vec::new();
    if position_concentration > config.concentration_alert_threshold {
        alerts.push(format!(
            "concentration {position_concentration} exceeds threshold {}",
            config.concentration_alert_threshold
        ));
    }

    UserDailyReport {
        user_id: user_id.to_string(),
        volume,
        trade_count: closed_trades.len(),
        realized_pnl,
        unrealized_pnl,
        performance,
        concentration: position_concentration,
        alerts,
    }
}

pub fn build_daily_report(user_reports: Vec<UserDailyReport>, generated_at: SystemTime) -> DailyReport {
    let total_volume = user_reports.iter().map(|r| r.volume).sum();
    let total_realized_pnl = user_reports.iter().map(|r| r.realized_pnl).sum();
    DailyReport { generated_at, user_reports, total_volume, total_realized_pnl }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::money::CurrencyPair;
    use crate::core::order::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn user_report_summarizes_volume_and_pnl() {
        let mut position = Position::new("u1".into(), CurrencyPair::new("EUR", "USD"));
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1), SystemTime::now());
        position.apply_fill(Side::Sell, dec!(10_000), dec!(1.11), SystemTime::now());

        let config = AnalyticsConfig::default();
        let report = build_user_report("u1", &[position], Decimal::ZERO, &config);
        assert_eq!(report.trade_count, 1);
        assert_eq!(report.volume, dec!(10_000));
        assert_eq!(report.realized_pnl, dec!(100.00));
    }

    #[test]
    fn concentration_above_threshold_raises_an_alert() {
        let mut position = Position::new("u1".into(), CurrencyPair::new("EUR", "USD"));
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1), SystemTime::now());

        let mut config = AnalyticsConfig::default();
        config.concentration_alert_threshold = dec!(0.5);
        let report = build_user_report("u1", &[position], Decimal::ZERO, &config);
        assert_eq!(report.alerts.len(), 1);
    }
}
