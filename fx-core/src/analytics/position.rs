//! Per-(user, pair) position and its same-sign/opposite-sign fill update
//! rules (spec §3 "Position", §4.4 "Position update").

use crate::core::money::CurrencyPair;
use crate::core::order::Side;
use rust_decimal::Decimal;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub closed_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub user_id: String,
    pub pair: CurrencyPair,
    /// Signed in base-currency units: positive is long, negative is short.
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub total_cost: Decimal,
    pub realized_pnl: Decimal,
    pub trades: Vec<ClosedTrade>,
}

impl Position {
    pub fn new(user_id: String, pair: CurrencyPair) -> Self {
        Self {
            user_id,
            pair,
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            trades: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Applies one fill's worth of `side`/`quantity`/`price` per spec §4.4's
    /// update rule.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal, timestamp: SystemTime) {
        let signed_qty = quantity * Decimal::from(side.sign());
        let prev_quantity = self.quantity;

        if prev_quantity.is_zero() || prev_quantity.signum() == signed_qty.signum() {
            self.total_cost += quantity * price;
            self.quantity += signed_qty;
            if !self.quantity.is_zero() {
                self.average_price = self.total_cost.abs() / self.quantity.abs();
            }
            return;
        }

        // Opposite sign: closes (part of) the existing position.
        let closing_qty = signed_qty.abs().min(prev_quantity.abs());
        let realized = closing_qty * (price - self.average_price) * prev_quantity.signum();
        self.realized_pnl += realized;
        self.trades.push(ClosedTrade {
            quantity: closing_qty,
            entry_price: self.average_price,
            exit_price: price,
            realized_pnl: realized,
            closed_at: timestamp,
        });

        let new_quantity = prev_quantity + signed_qty;
        if new_quantity.is_zero() {
            self.total_cost = Decimal::ZERO;
            self.average_price = Decimal::ZERO;
        } else if new_quantity.signum() == prev_quantity.signum() {
            self.total_cost = new_quantity.abs() * self.average_price;
        } else {
            // Sign flipped: the fill overshot the old position, opening a
            // new one in the other direction at the fill price.
            self.average_price = price;
            self.total_cost = new_quantity.abs() * price;
        }
        self.quantity = new_quantity;
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
    fn same_side_fills_blend_into_a_volume_weighted_average() {
        let mut position = Position::new("u1".into(), eur_usd());
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1000), SystemTime::now());
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1020), SystemTime::now());
        assert_eq!(position.quantity, dec!(20_000));
        assert_eq!(position.average_price, dec!(1.1010));
    }

    #[test]
    fn opposite_side_fill_partially_closes_and_realizes_pnl() {
        let mut position = Position::new("u1".into(), eur_usd());
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1000), SystemTime::now());
        position.apply_fill(Side::Sell, dec!(4_000), dec!(1.1050), SystemTime::now());

        assert_eq!(position.realized_pnl, dec!(20.00));
        assert_eq!(position.quantity, dec!(6_000));
        assert_eq!(position.average_price, dec!(1.1000));
        assert_eq!(position.trades.len(), 1);
    }

    #[test]
    fn closing_fill_that_overshoots_flips_the_position() {
        let mut position = Position::new("u1".into(), eur_usd());
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1000), SystemTime::now());
        position.apply_fill(Side::Sell, dec!(15_000), dec!(1.1050), SystemTime::now());

        assert_eq!(position.quantity, dec!(-5_000));
        assert_eq!(position.average_price, dec!(1.1050));
        assert_eq!(position.realized_pnl, dec!(50.00));
    }

    #[test]
    fn exact_closing_fill_resets_cost_and_average() {
        let mut position = Position::new("u1".into(), eur_usd());
        position.apply_fill(Side::Buy, dec!(10_000), dec!(1.1000), SystemTime::now());
        position.apply_fill(Side::Sell, dec!(10_000), dec!(1.1000), SystemTime::now());

        assert!(position.is_flat());
        assert_eq!(position.total_cost, Decimal::ZERO);
        assert_eq!(position.average_price, Decimal::ZERO);
    }
}
