//! Settlement and its two legs (spec §3 "Settlement").

use crate::core::ids::{BatchId, ExecutionId, OrderId, SettlementId};
use crate::core::money::CurrencyPair;
use crate::core::order::Side;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementCycle {
    T0,
    T1,
    T2,
}

impl SettlementCycle {
    pub fn business_days(&self) -> i64 {
        match self {
            SettlementCycle::T0 => 0,
            SettlementCycle::T1 => 1,
            SettlementCycle::T2 => 2,
        }
    }

    pub fn as_config_str(&self) -> &'static str {
        match self {
            SettlementCycle::T0 => "T+0",
            SettlementCycle::T1 => "T+1",
            SettlementCycle::T2 => "T+2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "T+0" => Some(SettlementCycle::T0),
            "T+1" => Some(SettlementCycle::T1),
            "T+2" => Some(SettlementCycle::T2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegType {
    Pay,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Leg {
    pub leg_type: LegType,
    pub currency: String,
    pub amount: Decimal,
    pub status: LegStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Pending,
    Processing,
    Settled,
    Failed,
    Rejected,
}

impl SettlementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Settled | SettlementStatus::Failed | SettlementStatus::Rejected
        )
    }
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub id: SettlementId,
    pub order_id: OrderId,
    pub execution_id: ExecutionId,
    pub user_id: String,
    pub counterparty_id: String,
    pub pair: CurrencyPair,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub gross_amount: Decimal,
    pub commission: Decimal,
    pub net_amount: Decimal,
    pub settlement_cycle: SettlementCycle,
    pub settlement_date: chrono::NaiveDate,
    pub value_date: chrono::NaiveDate,
    pub status: SettlementStatus,
    pub legs: [Leg; 2],
    pub batch_id: Option<BatchId>,
    pub retry_count: u32,
}

/// Spec §3 "the two legs move opposite currencies and respect side (buy
/// receives base, pays quote; sell opposite)". Commission is folded into
/// the quote leg since it is always denominated in the quote currency for
/// this core's trades.
pub fn compute_legs(side: Side, pair: &CurrencyPair, quantity: Decimal, price: Decimal, commission: Decimal) -> [Leg; 2] {
    let gross_quote = quantity * price;
    match side {
        Side::Buy => [
            Leg {
                leg_type: LegType::Receive,
                currency: pair.base.clone(),
                amount: quantity,
                status: LegStatus::Pending,
            },
            Leg {
                leg_type: LegType::Pay,
                currency: pair.quote.clone(),
                amount: gross_quote + commission,
                status: LegStatus::Pending,
            },
        ],
        Side::Sell => [
            Leg {
                leg_type: LegType::Pay,
                currency: pair.base.clone(),
                amount: quantity,
                status: LegStatus::Pending,
            },
            Leg {
                leg_type: LegType::Receive,
                currency: pair.quote.clone(),
                amount: gross_quote - commission,
                status: LegStatus::Pending,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new("EUR", "USD")
    }

    #[test]
    fn buy_receives_base_and_pays_quote_plus_commission() {
        let legs = compute_legs(Side::Buy, &eur_usd(), dec!(10_000), dec!(1.1000), dec!(11));
        assert_eq!(legs[0].leg_type, LegType::Receive);
        assert_eq!(legs[0].currency, "EUR");
        assert_eq!(legs[0].amount, dec!(10_000));
        assert_eq!(legs[1].leg_type, LegType::Pay);
        assert_eq!(legs[1].currency, "USD");
        assert_eq!(legs[1].amount, dec!(11_011));
    }

    #[test]
    fn sell_pays_base_and_receives_quote_minus_commission() {
        let legs = compute_legs(Side::Sell, &eur_usd(), dec!(10_000), dec!(1.1000), dec!(11));
        assert_eq!(legs[0].leg_type, LegType::Pay);
        assert_eq!(legs[0].currency, "EUR");
        assert_eq!(legs[1].leg_type, LegType::Receive);
        assert_eq!(legs[1].currency, "USD");
        assert_eq!(legs[1].amount, dec!(10_989));
    }
}
