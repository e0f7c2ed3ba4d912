//! Execution algorithms (spec §4.2 "Algorithm selection" / "Slice shapes").
//!
//! Each algorithm answers one question per tick: given the remaining
//! quantity and how much time is left in the execution's budget, how big
//! should the next slice be and how urgently should it be worked.

use crate::core::order::{OrderType, Side};
use rust_decimal::Decimal;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Twap,
    Vwap,
    ImplementationShortfall,
    Pov,
    MarketMaking,
}

impl Algorithm {
    pub fn as_config_str(&self) -> &'static str {
        match self {
            Algorithm::Twap => "TWAP",
            Algorithm::Vwap => "VWAP",
            Algorithm::ImplementationShortfall => "IS",
            Algorithm::Pov => "POV",
            Algorithm::MarketMaking => "MM",
        }
    }
}

/// Spec §4.2 "Algorithm selection (default)".
pub fn select_default_algorithm(order_type: OrderType, quantity: Decimal) -> Algorithm {
    let large_order_threshold = Decimal::from(1_000_000);
    match order_type {
        OrderType::Market if quantity > large_order_threshold => Algorithm::Twap,
        OrderType::Market => Algorithm::ImplementationShortfall,
        OrderType::Limit => Algorithm::Pov,
        _ => Algorithm::Vwap,
    }
}

/// One algorithm's answer to "what should the next slice look like".
#[derive(Debug, Clone, Copy)]
pub struct SlicePlan {
    pub quantity: Decimal,
    pub urgency: Urgency,
    pub target_price: Option<Decimal>,
}

pub struct SliceInputs {
    pub remaining: Decimal,
    pub time_remaining: Duration,
    pub side: Side,
    pub bid: Decimal,
    pub ask: Decimal,
    pub spread: Decimal,
    pub participation_rate: Decimal,
    pub expected_period_volume: Decimal,
}

/// `None` only when there is nothing left to slice; the dispatcher only
/// calls this for active, non-exhausted contexts so that case is rare.
pub fn next_slice(algorithm: Algorithm, inputs: &SliceInputs) -> Option<SlicePlan> {
    if inputs.remaining <= Decimal::ZERO {
        return None;
    }
    let plan = match algorithm {
        Algorithm::Twap => {
            let ten_second_buckets = (inputs.time_remaining.as_secs() as f64 / 10.0).ceil().max(1.0);
            let buckets = Decimal::try_from(ten_second_buckets).unwrap_or(Decimal::ONE);
            SlicePlan {
                quantity: (inputs.remaining / buckets).min(inputs.remaining),
                urgency: Urgency::Low,
                target_price: None,
            }
        }
        Algorithm::Vwap => SlicePlan {
            quantity: (inputs.remaining * Decimal::new(1, 1)).min(inputs.remaining),
            urgency: Urgency::Normal,
            target_price: None,
        },
        Algorithm::ImplementationShortfall => SlicePlan {
            quantity: (inputs.remaining * Decimal::new(2, 1)).min(inputs.remaining),
            urgency: Urgency::High,
            target_price: None,
        },
        Algorithm::Pov => SlicePlan {
            quantity: (inputs.participation_rate * inputs.expected_period_volume).min(inputs.remaining),
            urgency: Urgency::Normal,
            target_price: None,
        },
        Algorithm::MarketMaking => {
            let offset = inputs.spread * Decimal::new(3, 1);
            let target_price = match inputs.side {
                Side::Buy => inputs.bid + offset,
                Side::Sell => inputs.ask - offset,
            };
            SlicePlan {
                quantity: (inputs.remaining * Decimal::new(5, 2)).min(inputs.remaining),
                urgency: Urgency::Low,
                target_price: Some(target_price),
            }
        }
    };
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn large_market_order_uses_twap() {
        assert_eq!(
            select_default_algorithm(OrderType::Market, dec!(2_000_000)),
            Algorithm::Twap
        );
    }

    #[test]
    fn small_market_order_uses_implementation_shortfall() {
        assert_eq!(
            select_default_algorithm(OrderType::Market, dec!(50_000)),
            Algorithm::ImplementationShortfall
        );
    }

    #[test]
    fn limit_order_uses_pov() {
        assert_eq!(select_default_algorithm(OrderType::Limit, dec!(1_000)), Algorithm::Pov);
    }

    #[test]
    fn stop_order_falls_back_to_vwap() {
        assert_eq!(select_default_algorithm(OrderType::Stop, dec!(1_000)), Algorithm::Vwap);
    }

    fn inputs(remaining: Decimal) -> SliceInputs {
        SliceInputs {
            remaining,
            time_remaining: Duration::from_secs(30),
            side: Side::Buy,
            bid: dec!(1.0995),
            ask: dec!(1.1005),
            spread: dec!(0.0010),
            participation_rate: dec!(0.1),
            expected_period_volume: dec!(1_000_000),
        }
    }

    #[test]
    fn twap_divides_by_ten_second_buckets() {
        let plan = next_slice(Algorithm::Twap, &inputs(dec!(30_000))).unwrap();
        assert_eq!(plan.quantity, dec!(10_000));
        assert_eq!(plan.urgency, Urgency::Low);
    }

    #[test]
    fn vwap_slices_ten_percent_of_remaining() {
        let plan = next_slice(Algorithm::Vwap, &inputs(dec!(50_000))).unwrap();
        assert_eq!(plan.quantity, dec!(5_000.0));
    }

    #[test]
    fn market_making_targets_inside_the_spread() {
        let plan = next_slice(Algorithm::MarketMaking, &inputs(dec!(20_000))).unwrap();
        assert_eq!(plan.target_price, Some(dec!(1.0995) + dec!(0.0010) * dec!(0.3)));
    }

    #[test]
    fn no_slice_when_nothing_remains() {
        assert!(next_slice(Algorithm::Vwap, &inputs(dec!(0))).is_none());
    }
}
