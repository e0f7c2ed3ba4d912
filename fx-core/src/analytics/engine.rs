//! Analytics Engine (spec §4.4): maintains positions off fill events, ticks
//! a P&L calculator, and produces daily reports.

use crate::analytics::pnl::{calculate_snapshot, PnLSnapshot};
use crate::analytics::position::Position;
use crate::analytics::report::{build_daily_report, build_user_report, DailyReport};
use crate::config::AnalyticsConfig;
use crate::core::events::{CoreEvent, DailyReportGenerated, EventBus, PnlCalculated, TradeAnalyzed};
use crate::external::rate_provider::RateProvider;
use crate::monitoring::metrics::CoreMetrics;
use crate::order_manager::OrderManager;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Positions are keyed by `(user_id, pair)`; the spec's "created lazily on
/// first fill, remains until quantity==0" lifecycle means entries are never
/// proactively removed — a flat position is cheap to keep around and a flag
/// (`Position::is_flat`) tells callers to skip it.
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    order_manager: Arc<OrderManager>,
    rate_provider: Arc<dyn RateProvider>,
    positions: DashMap<(String, String), Mutex<Position>>,
    snapshots: DashMap<String, PnLSnapshot>,
    events: EventBus,
    metrics: Option<Arc<CoreMetrics>>,
}

impl AnalyticsEngine {
    pub fn new(
        config: AnalyticsConfig,
        order_manager: Arc<OrderManager>,
        rate_provider: Arc<dyn RateProvider>,
        events: EventBus,
        metrics: Option<Arc<CoreMetrics>>,
    ) -> Arc<Self> {
        Arc::new(Self { config, order_manager, rate_provider, positions: DashMap::new(), snapshots: DashMap::new(), events, metrics })
    }

    pub fn pnl_tick_interval(&self) -> Duration {
        Duration::from_secs(self.config.pnl_calculation_interval_secs)
    }

    /// Subscribes to the event bus and feeds every executed slice into its
    /// order's user/pair position. Mirrors the Settlement Engine's own
    /// `SliceExecuted` subscription: the spec's Ownership rule means fills
    /// reach the Analytics Engine the same decoupled way they reach
    /// settlement, not via a direct call from the Execution Engine.
    pub fn spawn_fill_listener(self: &Arc<Self>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut receiver = engine.events.subscribe();
            loop {
                match receiver.recv().await {
                    Ok(CoreEvent::SliceExecuted(slice)) => engine.apply_fill(&slice).await,
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "analytics engine lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn apply_fill(&self, slice: &crate::core::events::SliceExecuted) {
        let Some(order) = self.order_manager.get_order(slice.order_id) else {
            warn!(order_id = %slice.order_id, "fill reported for unknown order, skipping position update");
            return;
        };

        let key = (order.user_id.clone(), order.pair.as_str());
        let entry = self.positions.entry(key).or_insert_with(|| Mutex::new(Position::new(order.user_id.clone(), order.pair.clone())));
        let mut position = entry.lock();
        let pnl_before = position.realized_pnl;
        position.apply_fill(order.side, slice.quantity, slice.price, SystemTime::now());

        if position.realized_pnl != pnl_before {
            self.events.publish(CoreEvent::TradeAnalyzed(TradeAnalyzed {
                user_id: order.user_id.clone(),
                order_id: order.id,
                realized_pnl: position.realized_pnl - pnl_before,
            }));
        }
        debug!(user_id = %order.user_id, pair = %order.pair, quantity = %slice.quantity, "position updated from fill");
    }

    fn positions_for_user(&self, user_id: &str) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().lock().clone())
            .collect()
    }

    fn all_user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.positions.iter().map(|entry| entry.key().0.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// One P&L tick: mark every user's open positions, publish
    /// `pnlCalculated` per user, and update the open-positions gauge.
    pub async fn tick(&self) {
        let start = std::time::Instant::now();
        let rate_validity = Duration::from_secs(self.config.rate_validity_period_secs);
        let now = SystemTime::now();

        let mut open_positions = 0usize;
        for user_id in self.all_user_ids() {
            let positions = self.positions_for_user(&user_id);
            open_positions += positions.iter().filter(|p| !p.is_flat()).count();

            let previous = self.snapshots.get(&user_id).map(|s| s.clone());
            let snapshot = calculate_snapshot(
                &user_id,
                &positions,
                self.rate_provider.as_ref(),
                &self.config.base_currency,
                rate_validity,
                now,
                previous.as_ref(),
            )
            .await;
            self.events.publish(CoreEvent::PnlCalculated(PnlCalculated {
                user_id: user_id.clone(),
                total_pnl: snapshot.total_pnl,
                calculated_at: now,
            }));
            self.snapshots.insert(user_id, snapshot);
        }

        if let Some(metrics) = &self.metrics {
            metrics.open_positions.set(open_positions as i64);
            metrics.pnl_tick_duration_ms.observe(start.elapsed().as_secs_f64() * 1000.0);
        }
    }

    pub fn latest_snapshot(&self, user_id: &str) -> Option<PnLSnapshot> {
        self.snapshots.get(user_id).map(|s| s.clone())
    }

    /// Builds the end-of-day report across every user with a tracked
    /// position (spec §4.4 "Daily report").
    pub fn generate_daily_report(&self) -> DailyReport {
        let now = SystemTime::now();
        let user_reports = self
            .all_user_ids()
            .into_iter()
            .map(|user_id| {
                let positions = self.positions_for_user(&user_id);
                let unrealized = self.snapshots.get(&user_id).map(|s| s.unrealized_pnl).unwrap_or(rust_decimal::Decimal::ZERO);
                build_user_report(&user_id, &positions, unrealized, &self.config)
            })
            .collect::<Vec<_>>();

        let report = build_daily_report(user_reports, now);
        self.events.publish(CoreEvent::DailyReportGenerated(DailyReportGenerated {
            user_count: report.user_reports.len(),
            generated_at: now,
        }));
        report
    }
}
