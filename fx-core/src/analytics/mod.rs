//! Analytics Engine (spec §4.4): positions, mark-to-market P&L, risk
//! metrics, and the daily report.

pub mod engine;
pub mod pnl;
pub mod position;
pub mod report;
pub mod risk_metrics;

pub use engine::AnalyticsEngine;
pub use pnl::{CurrencyExposure, PnLSnapshot, PositionMark};
pub use position::{ClosedTrade, Position};
pub use report::{build_daily_report, build_user_report, DailyReport, UserDailyReport};
pub use risk_metrics::{concentration, leverage, performance_metrics, return_series_metrics, PerformanceMetrics, ReturnSeriesMetrics};
