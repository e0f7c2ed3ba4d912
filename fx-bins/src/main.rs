//! fx-core-daemon: boots the Order Manager, Execution Engine, Settlement
//! Engine, and Analytics Engine against in-memory mocks of every external
//! collaborator spec §1 places out of scope, and serves Prometheus metrics
//! until interrupted.

use anyhow::Context;
use clap::Parser;
use fx_core::config::Config;
use fx_core::core::events::EventBus;
use fx_core::external::{InMemoryAccountManager, InMemoryComplianceEngine, InMemoryPaymentSystem, InMemoryRateProvider, LiquidityProvider, MockLiquidityProvider, ProviderConfig};
use fx_core::monitoring::{init_logging, serve_metrics, CoreMetrics};
use fx_core::order_manager::OrderManager;
use fx_core::settlement::{NostroLedger, SettlementEngine};
use fx_core::{analytics::AnalyticsEngine, execution::ExecutionEngine};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fx-core-daemon", about = "FX trading and settlement core")]
struct Args {
    /// Path to a TOML config file. Falls back to built-in defaults.
    #[arg(long)]
    config: Option<String>,
}

fn seed_providers() -> Vec<Arc<dyn LiquidityProvider>> {
    let config = ProviderConfig { priority: 1, max_order_size: dec!(5_000_000), avg_latency_ms: 40, reliability: 0.99, cost_bps: 1.0 };
    vec![
        Arc::new(MockLiquidityProvider::new("bank_a", config, dec!(1.1000), dec!(0.0002))),
        Arc::new(MockLiquidityProvider::new("bank_b", config, dec!(1.1001), dec!(0.0003))),
    ]
}

fn seed_rates(rate_provider: &InMemoryRateProvider) {
    rate_provider.set_rate("EUR", "USD", dec!(1.1000), dec!(0.0002));
    rate_provider.set_rate("GBP", "USD", dec!(1.2700), dec!(0.0003));
    rate_provider.set_rate("USD", "JPY", dec!(150.00), dec!(0.02));
    rate_provider.set_rate("USD", "CAD", dec!(1.3600), dec!(0.0003));
}

fn seed_nostro(nostro: &NostroLedger) {
    for currency in ["USD", "EUR", "GBP", "JPY", "CAD"] {
        nostro.fund(currency, Decimal::new(1_000_000_000, 2));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config from {path}"))?,
        None => Config::load_default(),
    };

    let expiry_sweep_interval = Duration::from_secs(config.order_manager.expiry_sweep_interval_secs);
    let execution_tick_interval = Duration::from_millis(config.execution.tick_interval_ms);
    let settlement_tick_interval = Duration::from_secs(config.settlement.processor_tick_interval_secs);
    let enable_prometheus = config.monitoring.enable_prometheus;
    let metrics_addr = config.monitoring.metrics_addr.clone();

    let metrics = Arc::new(CoreMetrics::new().context("registering prometheus metrics")?);
    let events = EventBus::default();

    let account_manager = Arc::new(InMemoryAccountManager::new());
    let rate_provider: Arc<InMemoryRateProvider> = Arc::new(InMemoryRateProvider::new());
    seed_rates(&rate_provider);
    let providers = seed_providers();
    let compliance = Arc::new(InMemoryComplianceEngine::new());
    let payment_system = Arc::new(InMemoryPaymentSystem::new());
    let nostro = NostroLedger::new();
    seed_nostro(&nostro);

    let order_manager = Arc::new(OrderManager::new(
        config.order_manager.clone(),
        account_manager.clone(),
        events.clone(),
        Some(metrics.clone()),
    ));

    let execution_engine = Arc::new(ExecutionEngine::new(
        config.execution.clone(),
        providers,
        rate_provider.clone(),
        order_manager.clone(),
        events.clone(),
        Some(metrics.clone()),
    ));

    let settlement_engine = SettlementEngine::new(
        config.settlement.clone(),
        order_manager.clone(),
        compliance.clone(),
        payment_system.clone(),
        nostro,
        events.clone(),
        Some(metrics.clone()),
    );
    settlement_engine.spawn_fill_listener();

    let analytics_engine = AnalyticsEngine::new(
        config.analytics.clone(),
        order_manager.clone(),
        rate_provider.clone(),
        events.clone(),
        Some(metrics.clone()),
    );
    analytics_engine.spawn_fill_listener();

    let order_manager_ticker = order_manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(expiry_sweep_interval);
        loop {
            interval.tick().await;
            order_manager_ticker.sweep_expired().await;
        }
    });

    let execution_ticker = execution_engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(execution_tick_interval);
        loop {
            interval.tick().await;
            execution_ticker.tick().await;
        }
    });

    let settlement_ticker = settlement_engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(settlement_tick_interval);
        loop {
            interval.tick().await;
            settlement_ticker.tick().await;
        }
    });

    let analytics_ticker = analytics_engine.clone();
    let pnl_interval = analytics_engine.pnl_tick_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(pnl_interval);
        loop {
            interval.tick().await;
            analytics_ticker.tick().await;
        }
    });

    if enable_prometheus {
        let metrics_for_server = metrics.clone();
        let addr = metrics_addr
            .parse()
            .with_context(|| format!("parsing metrics_addr {metrics_addr:?}"))?;
        tokio::spawn(async move {
            if let Err(error) = serve_metrics(addr, metrics_for_server).await {
                tracing::error!(%error, "metrics server exited");
            }
        });
    }

    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || shutdown_signal.notify_one()).context("installing ctrl-c handler")?;

    info!("fx-core-daemon started");
    shutdown.notified().await;
    info!("shutdown signal received, exiting");
    Ok(())
}
