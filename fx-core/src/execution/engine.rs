//! Execution Engine (spec §4.2): the 100ms dispatcher that slices accepted
//! orders, scores and selects a liquidity provider per slice, and reports
//! fills back to the Order Manager.

use crate::config::ExecutionConfig;
use crate::core::events::{
    CoreEvent, EventBus, ExecutionCompleted, ExecutionError as ExecutionErrorEvent, ExecutionStarted,
    ExecutionTimeout, FillReport, SliceExecuted,
};
use crate::core::ids::{CorrelationId, ExecutionId};
use crate::core::money::CurrencyPair;
use crate::core::order::{Order, OrderType, Side};
use crate::execution::algorithms::{next_slice, select_default_algorithm, Algorithm, SliceInputs};
use crate::execution::context::{ExecutedSlice, ExecutionContext, ExecutionStatus};
use crate::execution::scoring::{composite_score, ScoreInputs};
use crate::external::liquidity_provider::{ExecutionRequest, LiquidityProvider, LiquidityProviderError, Quote};
use crate::external::rate_provider::RateProvider;
use crate::monitoring::CoreMetrics;
use crate::order_manager::OrderManager;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub algorithm: Option<Algorithm>,
    pub max_slippage: Option<Decimal>,
    pub time_limit: Option<Duration>,
    pub preferred_providers: Vec<String>,
}

pub struct ExecutionEngine {
    config: ExecutionConfig,
    providers: Vec<Arc<dyn LiquidityProvider>>,
    rate_provider: Arc<dyn RateProvider>,
    order_manager: Arc<OrderManager>,
    contexts: DashMap<ExecutionId, Arc<Mutex<ExecutionContext>>>,
    events: EventBus,
    metrics: Option<Arc<CoreMetrics>>,
}

impl ExecutionEngine {
    pub fn new(
        config: ExecutionConfig,
        providers: Vec<Arc<dyn LiquidityProvider>>,
        rate_provider: Arc<dyn RateProvider>,
        order_manager: Arc<OrderManager>,
        events: EventBus,
        metrics: Option<Arc<CoreMetrics>>,
    ) -> Self {
        Self {
            config,
            providers,
            rate_provider,
            order_manager,
            contexts: DashMap::new(),
            events,
            metrics,
        }
    }

    /// `Execute(order, options) → executionId` (spec §4.2).
    pub fn execute(&self, order: &Order, options: ExecuteOptions) -> ExecutionId {
        let algorithm = options
            .algorithm
            .unwrap_or_else(|| select_default_algorithm(order.order_type, order.remaining_quantity));
        let max_slippage = options.max_slippage.unwrap_or(self.config.max_slippage);
        let time_limit = options
            .time_limit
            .unwrap_or(Duration::from_secs(self.config.execution_timeout_secs));

        let execution_id = ExecutionId::generate();
        let limit_price = if order.order_type == OrderType::Limit {
            order.price
        } else {
            None
        };
        let context = ExecutionContext::new(
            execution_id,
            order.id,
            order.pair.clone(),
            order.side,
            limit_price,
            algorithm,
            order.remaining_quantity,
            max_slippage,
            time_limit,
            options.preferred_providers,
        );
        self.contexts.insert(execution_id, Arc::new(Mutex::new(context)));

        self.events.publish(CoreEvent::ExecutionStarted(ExecutionStarted {
            execution_id,
            order_id: order.id,
            algorithm: algorithm.as_config_str().to_string(),
            correlation_id: CorrelationId::from_order(order.id),
        }));
        execution_id
    }

    fn candidate_providers(&self, preferred: &[String]) -> Vec<Arc<dyn LiquidityProvider>> {
        if preferred.is_empty() {
            self.providers.clone()
        } else {
            self.providers
                .iter()
                .filter(|p| preferred.iter().any(|id| id == p.id()))
                .cloned()
                .collect()
        }
    }

    /// One 100ms tick (spec §4.2 "Scheduling model"): advance every active
    /// context by at most one slice.
    pub async fn tick(&self) {
        let active: Vec<(ExecutionId, Arc<Mutex<ExecutionContext>>)> = self
            .contexts
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (execution_id, context_lock) in active {
            self.advance_context(execution_id, &context_lock).await;

            let done = {
                let context = context_lock.lock().await;
                context.status.is_terminal()
            };
            if done {
                self.contexts.remove(&execution_id);
            }
        }
    }

    async fn advance_context(&self, execution_id: ExecutionId, context_lock: &Arc<Mutex<ExecutionContext>>) {
        let correlation_id = {
            let mut context = context_lock.lock().await;
            if context.status.is_terminal() {
                return;
            }
            if context.elapsed() > context.time_limit {
                context.finish(ExecutionStatus::Timeout);
                let correlation_id = CorrelationId::from_order(context.order_id);
                self.events.publish(CoreEvent::ExecutionTimeout(ExecutionTimeout {
                    execution_id,
                    order_id: context.order_id,
                    filled_quantity: context.executions.iter().map(|e| e.quantity).sum(),
                    correlation_id,
                }));
                return;
            }
            if context.remaining <= Decimal::ZERO {
                self.complete(execution_id, &mut context);
                return;
            }
            context.status = ExecutionStatus::Running;
            CorrelationId::from_order(context.order_id)
        };

        self.work_one_slice(execution_id, context_lock, correlation_id).await;
    }

    fn complete(&self, execution_id: ExecutionId, context: &mut ExecutionContext) {
        context.finish(ExecutionStatus::Completed);
        self.events.publish(CoreEvent::ExecutionCompleted(ExecutionCompleted {
            execution_id,
            order_id: context.order_id,
            average_price: context.average_price,
            slippage: context.slippage,
            correlation_id: CorrelationId::from_order(context.order_id),
        }));
    }

    async fn work_one_slice(
        &self,
        execution_id: ExecutionId,
        context_lock: &Arc<Mutex<ExecutionContext>>,
        correlation_id: CorrelationId,
    ) {
        let (pair, algorithm, remaining, time_remaining, side, max_slippage, preferred, limit_price, order_id) = {
            let context = context_lock.lock().await;
            (
                context.pair.clone(),
                context.algorithm,
                context.remaining,
                context.time_remaining(),
                context.side,
                context.max_slippage,
                context.preferred_providers.clone(),
                context.limit_price,
                context.order_id,
            )
        };

        let rate = match self.rate_provider.get_rate(&pair.base, &pair.quote).await {
            Some(rate) => rate,
            None => {
                self.fail_slice(execution_id, context_lock, correlation_id, "no rate available").await;
                return;
            }
        };

        let slice = match next_slice(
            algorithm,
            &SliceInputs {
                remaining,
                time_remaining,
                side,
                bid: rate.bid,
                ask: rate.ask,
                spread: rate.spread,
                participation_rate: self.config.participation_rate,
                expected_period_volume: self.config.pov_expected_period_volume,
            },
        ) {
            Some(slice) => slice,
            None => return,
        };

        let target_price = slice.target_price.unwrap_or_else(|| limit_price.unwrap_or(rate.mid()));
        let candidates = self.candidate_providers(&preferred);
        if candidates.is_empty() {
            self.fail_slice(execution_id, context_lock, correlation_id, "no liquidity providers configured")
                .await;
            return;
        }

        let chosen = if self.config.enable_smart_routing {
            self.select_provider(&candidates, &pair, side, slice.quantity).await
        } else {
            let provider = candidates[0].clone();
            let quote = provider.quote(&pair.as_str(), slice.quantity, side).await.ok();
            quote.map(|quote| (provider, quote))
        };

        let Some((provider, quote)) = chosen else {
            self.fail_slice(execution_id, context_lock, correlation_id, "no provider returned a quote")
                .await;
            return;
        };

        let slippage = if target_price.is_zero() {
            Decimal::ZERO
        } else {
            (quote.price - target_price).abs() / target_price
        };
        if slippage > max_slippage {
            self.fail_slice(execution_id, context_lock, correlation_id, "slice slippage exceeded maxSlippage")
                .await;
            return;
        }

        let report = provider
            .execute(
                &execution_id.to_string(),
                ExecutionRequest {
                    quantity: slice.quantity,
                    price: quote.price,
                    side,
                    urgency: slice.urgency,
                },
            )
            .await;

        match report {
            Ok(report) => {
                let price_improvement = match side {
                    Side::Buy => target_price - report.execution_price,
                    Side::Sell => report.execution_price - target_price,
                };

                {
                    let mut context = context_lock.lock().await;
                    context.record_slice(ExecutedSlice {
                        quantity: report.filled_quantity,
                        price: report.execution_price,
                        commission: report.commission,
                    });
                }

                if let Some(metrics) = &self.metrics {
                    metrics.fills_recorded_total.inc();
                }

                self.events.publish(CoreEvent::SliceExecuted(SliceExecuted {
                    execution_id,
                    order_id,
                    provider_id: provider.id().to_string(),
                    quantity: report.filled_quantity,
                    price: report.execution_price,
                    commission: report.commission,
                    price_improvement,
                    correlation_id,
                }));

                let fill_result = self
                    .order_manager
                    .record_fill(FillReport {
                        order_id,
                        execution_id,
                        provider_id: provider.id().to_string(),
                        quantity: report.filled_quantity,
                        price: report.execution_price,
                        commission: report.commission,
                        timestamp: std::time::SystemTime::now(),
                        correlation_id,
                    })
                    .await;
                if let Err(err) = fill_result {
                    tracing::warn!(%execution_id, %err, "order manager rejected a fill report");
                }
            }
            Err(err) => {
                self.fail_slice(execution_id, context_lock, correlation_id, &err.to_string())
                    .await;
            }
        }
    }

    async fn select_provider(
        &self,
        candidates: &[Arc<dyn LiquidityProvider>],
        pair: &CurrencyPair,
        side: Side,
        quantity: Decimal,
    ) -> Option<(Arc<dyn LiquidityProvider>, Quote)> {
        let mut joinset: JoinSet<(Arc<dyn LiquidityProvider>, Result<Quote, LiquidityProviderError>)> =
            JoinSet::new();
        for provider in candidates.iter().cloned() {
            let pair_str = pair.as_str();
            joinset.spawn(async move {
                let quote = provider.quote(&pair_str, quantity, side).await;
                (provider, quote)
            });
        }

        let mut best: Option<(Arc<dyn LiquidityProvider>, Quote, f64)> = None;
        while let Some(joined) = joinset.join_next().await {
            let Ok((provider, quote)) = joined else { continue };
            let Ok(quote) = quote else { continue };
            let score = composite_score(&ScoreInputs {
                quote_spread: quote.spread,
                config: provider.config(),
                stats: provider.stats(),
                quantity,
            });
            if best.as_ref().map_or(true, |(_, _, best_score)| score > *best_score) {
                best = Some((provider, quote, score));
            }
        }
        best.map(|(provider, quote, _)| (provider, quote))
    }

    async fn fail_slice(
        &self,
        execution_id: ExecutionId,
        context_lock: &Arc<Mutex<ExecutionContext>>,
        correlation_id: CorrelationId,
        reason: &str,
    ) {
        let (exceeded, order_id) = {
            let mut context = context_lock.lock().await;
            context.record_failure();
            (
                context.consecutive_failures > self.config.max_partial_fills,
                context.order_id,
            )
        };

        if exceeded {
            let mut context = context_lock.lock().await;
            context.finish(ExecutionStatus::Error);
            if let Some(metrics) = &self.metrics {
                metrics.executions_timed_out_total.inc();
            }
            self.events.publish(CoreEvent::ExecutionError(ExecutionErrorEvent {
                execution_id,
                order_id,
                reason: reason.to_string(),
                correlation_id,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::OrderId;
    use crate::core::order::{NewOrderParams, TimeInForce};
    use crate::external::account_manager::InMemoryAccountManager;
    use crate::external::liquidity_provider::{MockLiquidityProvider, ProviderConfig};
    use crate::external::rate_provider::InMemoryRateProvider;
    use rust_decimal_macros::dec;

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new("EUR", "USD")
    }

    fn test_order() -> Order {
        Order::new(
            OrderId::generate(),
            NewOrderParams {
                user_id: "u1".into(),
                client_order_id: None,
                side: Side::Buy,
                order_type: OrderType::Limit,
                pair: eur_usd(),
                quantity: dec!(10_000),
                price: Some(dec!(1.1000)),
                stop_price: None,
                time_in_force: TimeInForce::Gtc,
                expires_at: None,
            },
            dec!(1),
            dec!(10_000_000),
        )
        .unwrap()
    }

    fn provider(id: &str, mid: Decimal) -> Arc<dyn LiquidityProvider> {
        Arc::new(MockLiquidityProvider::new(
            id,
            ProviderConfig {
                priority: 1,
                max_order_size: dec!(1_000_000),
                avg_latency_ms: 20,
                reliability: 0.99,
                cost_bps: 1.0,
            },
            mid,
            dec!(0.0006),
        ))
    }

    fn engine(providers: Vec<Arc<dyn LiquidityProvider>>) -> (ExecutionEngine, Arc<OrderManager>) {
        let account_manager = Arc::new(InMemoryAccountManager::new());
        account_manager.fund("u1", "USD", dec!(50_000));
        let order_manager = Arc::new(OrderManager::new(
            Default::default(),
            account_manager,
            EventBus::default(),
            None,
        ));
        let rate_provider = Arc::new(InMemoryRateProvider::new());
        rate_provider.set_rate("EUR", "USD", dec!(1.1000), dec!(0.0006));
        let engine = ExecutionEngine::new(
            ExecutionConfig::default(),
            providers,
            rate_provider,
            order_manager.clone(),
            EventBus::default(),
            None,
        );
        (engine, order_manager)
    }

    #[tokio::test]
    async fn full_order_fills_across_ticks() {
        let (engine, order_manager) = engine(vec![provider("bank_a", dec!(1.1000))]);
        let order = test_order();
        order_manager
            .create_order(
                order.id,
                crate::order_manager::CreateOrderParams {
                    user_id: order.user_id.clone(),
                    client_order_id: None,
                    side: order.side,
                    order_type: order.order_type,
                    pair: order.pair.clone(),
                    quantity: order.original_quantity,
                    price: order.price,
                    stop_price: order.stop_price,
                    time_in_force: order.time_in_force,
                },
                None,
            )
            .await
            .unwrap();

        let execution_id = engine.execute(&order, ExecuteOptions::default());

        for _ in 0..20 {
            engine.tick().await;
            let managed = order_manager.get_order(order.id).unwrap();
            if managed.status == OrderStatus::Filled {
                break;
            }
        }

        let managed = order_manager.get_order(order.id).unwrap();
        assert_eq!(managed.status, OrderStatus::Filled);
        assert!(!engine.contexts.contains_key(&execution_id));
    }

    #[tokio::test]
    async fn smart_routing_prefers_the_tighter_spread_provider() {
        let tight = provider("tight", dec!(1.1000));
        let wide: Arc<dyn LiquidityProvider> = Arc::new(MockLiquidityProvider::new(
            "wide",
            ProviderConfig {
                priority: 1,
                max_order_size: dec!(1_000_000),
                avg_latency_ms: 500,
                reliability: 0.5,
                cost_bps: 20.0,
            },
            dec!(1.1000),
            dec!(0.05),
        ));
        let (engine, _order_manager) = engine(vec![wide, tight]);
        let chosen = engine
            .select_provider(&engine.providers.clone(), &eur_usd(), Side::Buy, dec!(1_000))
            .await;
        assert_eq!(chosen.unwrap().0.id(), "tight");
    }
}
