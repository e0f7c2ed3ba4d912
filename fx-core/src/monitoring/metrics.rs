//! Prometheus metrics, teacher-style (`monitoring/metrics.rs` split from
//! the HTTP server that exposes them).

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub struct CoreMetrics {
    pub registry: Registry,
    pub orders_created_total: IntCounter,
    pub orders_rejected_total: IntCounter,
    pub fills_recorded_total: IntCounter,
    pub fill_latency_ms: Histogram,
    pub executions_timed_out_total: IntCounter,
    pub settlements_created_total: IntCounter,
    pub settlements_failed_total: IntCounterVec,
    pub netting_batch_size: Histogram,
    pub pnl_tick_duration_ms: Histogram,
    pub open_positions: IntGauge,
}

impl CoreMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::with_opts(Opts::new("fx_orders_created_total", "orders accepted by the Order Manager"))?;
        let orders_rejected_total =
            IntCounter::with_opts(Opts::new("fx_orders_rejected_total", "orders rejected at validation or reservation"))?;
        let fills_recorded_total =
            IntCounter::with_opts(Opts::new("fx_fills_recorded_total", "fills recorded against orders"))?;
        let fill_latency_ms = Histogram::with_opts(HistogramOpts::new(
            "fx_fill_latency_ms",
            "provider round-trip latency per fill, in milliseconds",
        ))?;
        let executions_timed_out_total = IntCounter::with_opts(Opts::new(
            "fx_executions_timed_out_total",
            "executions that hit their time limit before filling completely",
        ))?;
        let settlements_created_total =
            IntCounter::with_opts(Opts::new("fx_settlements_created_total", "settlements created from fills"))?;
        let settlements_failed_total = IntCounterVec::new(
            Opts::new("fx_settlements_failed_total", "settlements that failed, by reason"),
            &["reason"],
        )?;
        let netting_batch_size = Histogram::with_opts(HistogramOpts::new(
            "fx_netting_batch_size",
            "number of settlements per netting batch",
        ))?;
        let pnl_tick_duration_ms = Histogram::with_opts(HistogramOpts::new(
            "fx_pnl_tick_duration_ms",
            "time spent in one P&L revaluation tick, in milliseconds",
        ))?;
        let open_positions =
            IntGauge::with_opts(Opts::new("fx_open_positions", "number of non-zero positions across all users"))?;

        registry.register(Box::new(orders_created_total.clone()))?;
        registry.register(Box::new(orders_rejected_total.clone()))?;
        registry.register(Box::new(fills_recorded_total.clone()))?;
        registry.register(Box::new(fill_latency_ms.clone()))?;
        registry.register(Box::new(executions_timed_out_total.clone()))?;
        registry.register(Box::new(settlements_created_total.clone()))?;
        registry.register(Box::new(settlements_failed_total.clone()))?;
        registry.register(Box::new(netting_batch_size.clone()))?;
        registry.register(Box::new(pnl_tick_duration_ms.clone()))?;
        registry.register(Box::new(open_positions.clone()))?;

        Ok(Self {
            registry,
            orders_created_total,
            orders_rejected_total,
            fills_recorded_total,
            fill_latency_ms,
            executions_timed_out_total,
            settlements_created_total,
            settlements_failed_total,
            netting_batch_size,
            pnl_tick_duration_ms,
            open_positions,
        })
    }
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new().expect("metric registration cannot fail with fixed, non-duplicate names")
    }
}
