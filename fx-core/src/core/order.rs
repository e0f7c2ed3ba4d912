//! Order, Fill, and the order status state machine (spec §3, §4.1).
//!
//! Status transitions are a closed sum type with an allow-list checked on
//! every write (Design Note 6), replacing the source's dynamically typed
//! status field. `Order::apply_fill` is idempotent on `ExecutionId` so a
//! duplicate report from the Execution Engine never double-counts (spec
//! §4.1 "Fill recording is idempotent by executionId").

use crate::core::ids::{ExecutionId, OrderId, ProviderId};
use crate::core::errors::{StateConflictError, ValidationError};
use crate::core::money::{round_price, round_quantity, CurrencyPair};
use rust_decimal::Decimal;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(&self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
}

impl OrderType {
    pub fn is_stop_kind(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit | OrderType::TrailingStop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Allow-list of legal transitions, spec §4.1's state machine table.
    fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Submitted, Rejected],
            Submitted => &[PartialFilled, Filled, Cancelled, Expired],
            PartialFilled => &[PartialFilled, Filled, Cancelled, Expired],
            Filled | Cancelled | Rejected | Expired => &[],
        }
    }

    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        self.allowed_next().contains(&to)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::PartialFilled => "partial_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub provider_id: ProviderId,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: SystemTime,
    pub latency_ms: u64,
    pub commission: Decimal,
    pub price_improvement: Decimal,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    pub client_order_id: Option<String>,
    pub side: Side,
    pub order_type: OrderType,
    pub pair: CurrencyPair,
    pub original_quantity: Decimal,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub fills: Vec<Fill>,
    pub average_fill_price: Decimal,
    pub expires_at: Option<SystemTime>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

pub struct NewOrderParams {
    pub user_id: String,
    pub client_order_id: Option<String>,
    pub side: Side,
    pub order_type: OrderType,
    pub pair: CurrencyPair,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expires_at: Option<SystemTime>,
}

impl Order {
    /// Construct and validate a new order per spec §4.1's validation rules.
    /// Does not reserve funds or insert into the book — that is the Order
    /// Manager's job once reservation succeeds.
    pub fn new(
        id: OrderId,
        params: NewOrderParams,
        min_order_size: Decimal,
        max_order_size: Decimal,
    ) -> Result<Self, ValidationError> {
        if params.quantity < min_order_size || params.quantity > max_order_size {
            return Err(ValidationError::QuantityOutOfRange {
                quantity: params.quantity.to_string(),
                min: min_order_size.to_string(),
                max: max_order_size.to_string(),
            });
        }

        if matches!(params.order_type, OrderType::Limit | OrderType::StopLimit) && params.price.is_none()
        {
            return Err(ValidationError::MissingStopFields(format!(
                "{:?} requires price",
                params.order_type
            )));
        }
        if params.order_type.is_stop_kind() && params.stop_price.is_none() {
            return Err(ValidationError::MissingStopFields(format!(
                "{:?} requires stopPrice",
                params.order_type
            )));
        }

        if params.order_type == OrderType::StopLimit {
            let stop = params.stop_price.expect("checked above");
            let limit = params.price.expect("checked above");
            let ok = match params.side {
                Side::Buy => stop > limit,
                Side::Sell => stop < limit,
            };
            if !ok {
                return Err(ValidationError::InvalidStopLimitOrdering {
                    side: format!("{:?}", params.side),
                    stop: stop.to_string(),
                    limit: limit.to_string(),
                });
            }
        }

        let now = SystemTime::now();
        let quantity = round_quantity(&params.pair, params.quantity);
        let price = params.price.map(|p| round_price(&params.pair, p));
        let stop_price = params.stop_price.map(|p| round_price(&params.pair, p));

        Ok(Order {
            id,
            user_id: params.user_id,
            client_order_id: params.client_order_id,
            side: params.side,
            order_type: params.order_type,
            pair: params.pair,
            original_quantity: quantity,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: quantity,
            price,
            stop_price,
            time_in_force: params.time_in_force,
            status: OrderStatus::Pending,
            fills: Vec::new(),
            average_fill_price: Decimal::ZERO,
            expires_at: params.expires_at,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition(&mut self, to: OrderStatus) -> Result<(), StateConflictError> {
        if !self.status.can_transition_to(to) {
            return Err(StateConflictError {
                order_id: self.id,
                status: self.status.to_string(),
                operation: format!("transition to {to}"),
            });
        }
        self.status = to;
        self.updated_at = SystemTime::now();
        Ok(())
    }

    pub fn mark_submitted(&mut self) -> Result<(), StateConflictError> {
        self.transition(OrderStatus::Submitted)
    }

    pub fn reject(&mut self) -> Result<(), StateConflictError> {
        self.transition(OrderStatus::Rejected)
    }

    pub fn cancel(&mut self) -> Result<(), StateConflictError> {
        if self.status.is_terminal() {
            // Cancel of a terminal order is a no-op success (spec §4.1, §8).
            return Ok(());
        }
        self.transition(OrderStatus::Cancelled)
    }

    pub fn expire(&mut self) -> Result<(), StateConflictError> {
        self.transition(OrderStatus::Expired)
    }

    pub fn can_modify(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Submitted)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Pending | OrderStatus::Submitted | OrderStatus::PartialFilled
        )
    }

    /// Apply a fill reported by the Execution Engine. Idempotent on
    /// `execution_id` — a duplicate report is silently ignored and returns
    /// `Ok(false)`.
    pub fn apply_fill(&mut self, fill: Fill) -> Result<bool, StateConflictError> {
        if self.fills.iter().any(|f| f.execution_id == fill.execution_id) {
            return Ok(false);
        }
        if self.status.is_terminal() {
            return Err(StateConflictError {
                order_id: self.id,
                status: self.status.to_string(),
                operation: "apply_fill".to_string(),
            });
        }

        let filled_notional: Decimal = self
            .fills
            .iter()
            .map(|f| f.quantity * f.price)
            .sum::<Decimal>()
            + fill.quantity * fill.price;
        let total_filled = self.filled_quantity + fill.quantity;

        self.filled_quantity = total_filled;
        self.remaining_quantity = (self.original_quantity - total_filled).max(Decimal::ZERO);
        self.average_fill_price = if total_filled.is_zero() {
            Decimal::ZERO
        } else {
            round_price(&self.pair, filled_notional / total_filled)
        };
        self.fills.push(fill);
        self.updated_at = SystemTime::now();

        if self.remaining_quantity <= Decimal::ZERO {
            self.transition(OrderStatus::Filled)?;
        } else {
            self.transition(OrderStatus::PartialFilled)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::OrderId;
    use rust_decimal_macros::dec;

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new("EUR", "USD")
    }

    fn limit_buy(quantity: Decimal, price: Decimal) -> Order {
        Order::new(
            OrderId::generate(),
            NewOrderParams {
                user_id: "u1".into(),
                client_order_id: None,
                side: Side::Buy,
                order_type: OrderType::Limit,
                pair: eur_usd(),
                quantity,
                price: Some(price),
                stop_price: None,
                time_in_force: TimeInForce::Gtc,
                expires_at: None,
            },
            dec!(1),
            dec!(10_000_000),
        )
        .unwrap()
    }

    #[test]
    fn quantity_below_minimum_is_rejected() {
        let err = Order::new(
            OrderId::generate(),
            NewOrderParams {
                user_id: "u1".into(),
                client_order_id: None,
                side: Side::Buy,
                order_type: OrderType::Limit,
                pair: eur_usd(),
                quantity: dec!(0.5),
                price: Some(dec!(1.1)),
                stop_price: None,
                time_in_force: TimeInForce::Gtc,
                expires_at: None,
            },
            dec!(1),
            dec!(10_000_000),
        );
        assert!(matches!(err, Err(ValidationError::QuantityOutOfRange { .. })));
    }

    #[test]
    fn quantity_at_minimum_is_accepted() {
        let order = Order::new(
            OrderId::generate(),
            NewOrderParams {
                user_id: "u1".into(),
                client_order_id: None,
                side: Side::Buy,
                order_type: OrderType::Limit,
                pair: eur_usd(),
                quantity: dec!(1),
                price: Some(dec!(1.1)),
                stop_price: None,
                time_in_force: TimeInForce::Gtc,
                expires_at: None,
            },
            dec!(1),
            dec!(10_000_000),
        );
        assert!(order.is_ok());
    }

    #[test]
    fn buy_stop_limit_requires_stop_above_limit() {
        let err = Order::new(
            OrderId::generate(),
            NewOrderParams {
                user_id: "u1".into(),
                client_order_id: None,
                side: Side::Buy,
                order_type: OrderType::StopLimit,
                pair: eur_usd(),
                quantity: dec!(1000),
                price: Some(dec!(1.10)),
                stop_price: Some(dec!(1.05)), // stop below limit: invalid for buy
                time_in_force: TimeInForce::Gtc,
                expires_at: None,
            },
            dec!(1),
            dec!(10_000_000),
        );
        assert!(matches!(err, Err(ValidationError::InvalidStopLimitOrdering { .. })));
    }

    #[test]
    fn fill_recomputes_weighted_average_price() {
        let mut order = limit_buy(dec!(10_000), dec!(1.1000));
        order.mark_submitted().unwrap();

        order
            .apply_fill(Fill {
                execution_id: ExecutionId::generate(),
                order_id: order.id,
                provider_id: "bank_a".into(),
                quantity: dec!(5000),
                price: dec!(1.0999),
                timestamp: SystemTime::now(),
                latency_ms: 10,
                commission: dec!(5.4995),
                price_improvement: dec!(0),
            })
            .unwrap();
        assert_eq!(order.status, OrderStatus::PartialFilled);

        order
            .apply_fill(Fill {
                execution_id: ExecutionId::generate(),
                order_id: order.id,
                provider_id: "bank_a".into(),
                quantity: dec!(5000),
                price: dec!(1.1000),
                timestamp: SystemTime::now(),
                latency_ms: 10,
                commission: dec!(5.5),
                price_improvement: dec!(0),
            })
            .unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, dec!(1.09995));
        assert_eq!(order.remaining_quantity, Decimal::ZERO);
    }

    #[test]
    fn duplicate_execution_id_does_not_double_count() {
        let mut order = limit_buy(dec!(1000), dec!(1.1));
        order.mark_submitted().unwrap();
        let execution_id = ExecutionId::generate();
        let fill = Fill {
            execution_id,
            order_id: order.id,
            provider_id: "bank_a".into(),
            quantity: dec!(1000),
            price: dec!(1.1),
            timestamp: SystemTime::now(),
            latency_ms: 5,
            commission: dec!(1.1),
            price_improvement: dec!(0),
        };
        assert!(order.apply_fill(fill.clone()).unwrap());
        assert!(!order.apply_fill(fill).unwrap());
        assert_eq!(order.filled_quantity, dec!(1000));
    }

    #[test]
    fn cancel_of_terminal_order_is_noop_success() {
        let mut order = limit_buy(dec!(1000), dec!(1.1));
        order.mark_submitted().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancel().is_ok());
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn buy_then_sell_same_quantity_nets_to_zero_realized_elsewhere() {
        // Order-level invariant only: originalQuantity = filled + remaining.
        let mut order = limit_buy(dec!(1000), dec!(1.1));
        order.mark_submitted().unwrap();
        order
            .apply_fill(Fill {
                execution_id: ExecutionId::generate(),
                order_id: order.id,
                provider_id: "bank_a".into(),
                quantity: dec!(1000),
                price: dec!(1.1),
                timestamp: SystemTime::now(),
                latency_ms: 1,
                commission: dec!(1.1),
                price_improvement: dec!(0),
            })
            .unwrap();
        assert_eq!(order.filled_quantity + order.remaining_quantity, order.original_quantity);
    }
}
