//! Liquidity provider client contract (spec §4.2, §6): `Quote`/`Execute`
//! plus the static provider config the scoring formula reads from.

use crate::core::order::Side;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    pub priority: u8,
    pub max_order_size: Decimal,
    pub avg_latency_ms: u64,
    pub reliability: f64,
    pub cost_bps: f64,
}

/// Rolling stats the scoring formula's `reliabilityScore` reads
/// (`stats.successRate`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderStats {
    pub successes: u64,
    pub failures: u64,
}

impl ProviderStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            100.0
        } else {
            (self.successes as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub price: Decimal,
    pub spread: Decimal,
    pub valid_until: SystemTime,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest {
    pub quantity: Decimal,
    pub price: Decimal,
    pub side: Side,
    pub urgency: crate::execution::algorithms::Urgency,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionReport {
    pub filled_quantity: Decimal,
    pub execution_price: Decimal,
    pub commission: Decimal,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LiquidityProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("quote timed out")]
    Timeout,
}

#[async_trait]
pub trait LiquidityProvider: Send + Sync {
    fn id(&self) -> &str;
    fn config(&self) -> ProviderConfig;
    fn stats(&self) -> ProviderStats;

    async fn quote(
        &self,
        pair: &str,
        quantity: Decimal,
        side: Side,
    ) -> Result<Quote, LiquidityProviderError>;

    async fn execute(
        &self,
        execution_id: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionReport, LiquidityProviderError>;
}

/// Deterministic mock provider: quotes at a configured mid +/- half spread,
/// always fills completely, optionally fails on a configured trigger
/// quantity to exercise the retry path of spec §8 scenario 2.
pub struct MockLiquidityProvider {
    id: String,
    config: ProviderConfig,
    mid: Decimal,
    spread: Decimal,
    stats: parking_lot::Mutex<ProviderStats>,
    fail_once_on: DashMap<String, bool>,
}

impl MockLiquidityProvider {
    pub fn new(id: impl Into<String>, config: ProviderConfig, mid: Decimal, spread: Decimal) -> Self {
        Self {
            id: id.into(),
            config,
            mid,
            spread,
            stats: parking_lot::Mutex::new(ProviderStats::default()),
            fail_once_on: DashMap::new(),
        }
    }

    /// Mark this provider as unavailable exactly once (next call fails).
    pub fn fail_next_quote(&self) {
        self.fail_once_on.insert("quote".to_string(), true);
    }
}

#[async_trait]
impl LiquidityProvider for MockLiquidityProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn config(&self) -> ProviderConfig {
        self.config
    }

    fn stats(&self) -> ProviderStats {
        *self.stats.lock()
    }

    async fn quote(
        &self,
        _pair: &str,
        _quantity: Decimal,
        side: Side,
    ) -> Result<Quote, LiquidityProviderError> {
        if let Some(mut should_fail) = self.fail_once_on.get_mut("quote") {
            if *should_fail {
                *should_fail = false;
                self.stats.lock().failures += 1;
                return Err(LiquidityProviderError::Unavailable(format!(
                    "{} is temporarily unavailable",
                    self.id
                )));
            }
        }
        let half = self.spread / Decimal::from(2);
        let price = match side {
            Side::Buy => self.mid + half,
            Side::Sell => self.mid - half,
        };
        Ok(Quote {
            price,
            spread: self.spread,
            valid_until: SystemTime::now() + Duration::from_secs(5),
        })
    }

    async fn execute(
        &self,
        _execution_id: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionReport, LiquidityProviderError> {
        self.stats.lock().successes += 1;
        let commission_rate = Decimal::new(1, 3); // 0.001 = 0.1%, spec §3 default
        let commission = request.quantity * request.price * commission_rate;
        Ok(ExecutionReport {
            filled_quantity: request.quantity,
            execution_price: request.price,
            commission,
        })
    }
}
