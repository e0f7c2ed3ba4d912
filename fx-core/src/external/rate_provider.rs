//! Rate Provider client contract (spec §6). An external mid/bid/ask oracle;
//! the core never discovers prices itself (spec §1 Non-goals).

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy)]
pub struct Rate {
    pub rate: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub spread: Decimal,
    pub timestamp: SystemTime,
    pub quality_score: Option<f64>,
}

impl Rate {
    pub fn mid(&self) -> Decimal {
        self.rate
    }

    pub fn is_stale(&self, validity_period: Duration) -> bool {
        SystemTime::now()
            .duration_since(self.timestamp)
            .map(|age| age > validity_period)
            .unwrap_or(true)
    }
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Returns `None` when the pair has no quote (spec §4.4 "missing market
    /// data" / §7 DataStale).
    async fn get_rate(&self, from: &str, to: &str) -> Option<Rate>;
}

/// In-memory oracle seeded by tests/the demo binary. Looks up the direct
/// pair, then the inverse, falling back to `None` (surfaced by callers as
/// `DataStaleError`).
pub struct InMemoryRateProvider {
    rates: DashMap<(String, String), Rate>,
}

impl InMemoryRateProvider {
    pub fn new() -> Self {
        Self {
            rates: DashMap::new(),
        }
    }

    pub fn set_rate(&self, from: &str, to: &str, mid: Decimal, spread: Decimal) {
        let half = spread / Decimal::from(2);
        let rate = Rate {
            rate: mid,
            bid: mid - half,
            ask: mid + half,
            spread,
            timestamp: SystemTime::now(),
            quality_score: Some(1.0),
        };
        self.rates.insert((from.to_string(), to.to_string()), rate);
    }

    pub fn clear_rate(&self, from: &str, to: &str) {
        self.rates.remove(&(from.to_string(), to.to_string()));
    }
}

impl Default for InMemoryRateProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateProvider for InMemoryRateProvider {
    async fn get_rate(&self, from: &str, to: &str) -> Option<Rate> {
        if from.eq_ignore_ascii_case(to) {
            return Some(Rate {
                rate: Decimal::ONE,
                bid: Decimal::ONE,
                ask: Decimal::ONE,
                spread: Decimal::ZERO,
                timestamp: SystemTime::now(),
                quality_score: Some(1.0),
            });
        }
        if let Some(rate) = self.rates.get(&(from.to_string(), to.to_string())) {
            return Some(*rate);
        }
        self.rates
            .get(&(to.to_string(), from.to_string()))
            .map(|r| Rate {
                rate: Decimal::ONE / r.rate,
                bid: Decimal::ONE / r.ask,
                ask: Decimal::ONE / r.bid,
                spread: r.spread,
                timestamp: r.timestamp,
                quality_score: r.quality_score,
            })
    }
}
