//! Provider composite score (spec §4.2 "Provider selection").

use crate::external::liquidity_provider::{ProviderConfig, ProviderStats};
use rust_decimal::Decimal;

pub struct ScoreInputs {
    pub quote_spread: Decimal,
    pub config: ProviderConfig,
    pub stats: ProviderStats,
    pub quantity: Decimal,
}

/// `score = 0.40·priceScore + 0.25·reliabilityScore + 0.20·latencyScore
/// + 0.10·capacityScore + 0.05·costScore`. Computed in `f64` since the
/// weights and sub-scores are all ratios, not ledger amounts.
pub fn composite_score(inputs: &ScoreInputs) -> f64 {
    let spread = inputs.quote_spread.abs().to_string().parse::<f64>().unwrap_or(0.0);
    let price_score = 1.0 / (1.0 + spread);

    let reliability_score = inputs.config.reliability * (inputs.stats.success_rate() / 100.0);

    let latency_score = 1.0 / (1.0 + inputs.config.avg_latency_ms as f64 / 1000.0);

    let quantity = inputs.quantity.to_string().parse::<f64>().unwrap_or(0.0);
    let max_order_size = inputs.config.max_order_size.to_string().parse::<f64>().unwrap_or(1.0);
    let capacity_score = if max_order_size > 0.0 {
        (quantity / max_order_size).min(1.0)
    } else {
        0.0
    };

    let cost_score = 1.0 / (1.0 + inputs.config.cost_bps / 100.0);

    0.40 * price_score + 0.25 * reliability_score + 0.20 * latency_score + 0.10 * capacity_score + 0.05 * cost_score
}

/// Picks the highest-scoring provider from `candidates`. Returns `None` for
/// an empty candidate set (the caller treats that as "no route available").
pub fn select_best_provider<'a, T>(
    candidates: &'a [T],
    score_of: impl Fn(&'a T) -> f64,
) -> Option<&'a T> {
    candidates
        .iter()
        .map(|c| (c, score_of(c)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> ProviderConfig {
        ProviderConfig {
            priority: 1,
            max_order_size: dec!(1_000_000),
            avg_latency_ms: 50,
            reliability: 0.99,
            cost_bps: 2.0,
        }
    }

    #[test]
    fn tighter_spread_scores_higher() {
        let stats = ProviderStats { successes: 100, failures: 0 };
        let tight = composite_score(&ScoreInputs {
            quote_spread: dec!(0.0005),
            config: config(),
            stats,
            quantity: dec!(10_000),
        });
        let wide = composite_score(&ScoreInputs {
            quote_spread: dec!(0.005),
            config: config(),
            stats,
            quantity: dec!(10_000),
        });
        assert!(tight > wide);
    }

    #[test]
    fn select_best_provider_picks_the_max_score() {
        let candidates = vec!["a", "b", "c"];
        let best = select_best_provider(&candidates, |c| match *c {
            "a" => 0.1,
            "b" => 0.9,
            _ => 0.5,
        });
        assert_eq!(best, Some(&"b"));
    }

    #[test]
    fn select_best_provider_on_empty_candidates_is_none() {
        let candidates: Vec<&str> = Vec::new();
        assert_eq!(select_best_provider(&candidates, |_| 1.0), None);
    }
}
