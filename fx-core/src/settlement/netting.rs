//! Netting batch construction (spec §4.3 "Netting").

use super::settlement::{LegType, Settlement};
use crate::core::ids::BatchId;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NettingBatchStatus {
    Open,
    Processing,
    Settled,
    PartiallyFailed,
}

#[derive(Debug, Clone)]
pub struct NetLeg {
    pub currency: String,
    pub net_amount: Decimal,
    pub direction: LegType,
}

#[derive(Debug, Clone)]
pub struct NettingBatch {
    pub id: BatchId,
    pub counterparty_id: String,
    pub settlement_date: chrono::NaiveDate,
    pub settlement_ids: Vec<crate::core::ids::SettlementId>,
    pub legs: Vec<NetLeg>,
    pub status: NettingBatchStatus,
}

/// Sums signed leg amounts per currency (receive = +, pay = −) across every
/// settlement in the group and drops currencies that net to within a cent
/// of zero (spec §4.3 "only legs with |amount| > 0.01 survive netting").
pub fn net_legs(settlements: &[&Settlement]) -> Vec<NetLeg> {
    let mut totals: HashMap<String, Decimal> = HashMap::new();
    for settlement in settlements {
        for leg in &settlement.legs {
            let signed = match leg.leg_type {
                LegType::Receive => leg.amount,
                LegType::Pay => -leg.amount,
            };
            *totals.entry(leg.currency.clone()).or_insert(Decimal::ZERO) += signed;
        }
    }

    totals
        .into_iter()
        .filter(|(_, amount)| amount.abs() > Decimal::new(1, 2))
        .map(|(currency, amount)| NetLeg {
            currency,
            net_amount: amount.abs(),
            direction: if amount.is_sign_positive() { LegType::Receive } else { LegType::Pay },
        })
        .collect()
}

pub fn build_batch(
    id: BatchId,
    counterparty_id: String,
    settlement_date: chrono::NaiveDate,
    settlements: &[&Settlement],
) -> NettingBatch {
    NettingBatch {
        id,
        counterparty_id,
        settlement_date,
        settlement_ids: settlements.iter().map(|s| s.id).collect(),
        legs: net_legs(settlements),
        status: NettingBatchStatus::Open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ExecutionId, OrderId, SettlementId};
    use crate::core::money::CurrencyPair;
    use crate::core::order::Side;
    use crate::settlement::settlement::{compute_legs, SettlementCycle, SettlementStatus};
    use rust_decimal_macros::dec;

    fn settlement(side: Side, quantity: Decimal, price: Decimal) -> Settlement {
        let pair = CurrencyPair::new("EUR", "USD");
        let legs = compute_legs(side, &pair, quantity, price, Decimal::ZERO);
        Settlement {
            id: SettlementId::generate(),
            order_id: OrderId::generate(),
            execution_id: ExecutionId::generate(),
            user_id: "u1".into(),
            counterparty_id: "bank_a".into(),
            pair,
            side,
            quantity,
            price,
            gross_amount: quantity * price,
            commission: Decimal::ZERO,
            net_amount: quantity * price,
            settlement_cycle: SettlementCycle::T2,
            settlement_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            value_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            status: SettlementStatus::Pending,
            legs,
            batch_id: None,
            retry_count: 0,
        }
    }

    #[test]
    fn opposite_side_trades_net_each_other_out() {
        let buy = settlement(Side::Buy, dec!(10_000), dec!(1.1000));
        let sell = settlement(Side::Sell, dec!(10_000), dec!(1.1000));
        let legs = net_legs(&[&buy, &sell]);
        assert!(legs.is_empty());
    }

    #[test]
    fn same_side_trades_accumulate() {
        let a = settlement(Side::Buy, dec!(10_000), dec!(1.1000));
        let b = settlement(Side::Buy, dec!(5_000), dec!(1.1000));
        let legs = net_legs(&[&a, &b]);
        let eur_leg = legs.iter().find(|l| l.currency == "EUR").unwrap();
        assert_eq!(eur_leg.net_amount, dec!(15_000));
        assert_eq!(eur_leg.direction, LegType::Receive);
    }
}
