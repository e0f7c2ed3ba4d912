//! Order Manager (spec §4.1): order + book ownership, atomic fund
//! reservation, fill recording, and the expiry sweep.

use super::book::{BookEntry, OrderBook};
use super::expiry::compute_expiry;
use crate::config::OrderManagerConfig;
use crate::core::errors::{
    AccessDeniedError, CoreError, InsufficientFundsError, NotFoundError, StateConflictError,
    ValidationError,
};
use crate::core::events::{
    CoreEvent, EventBus, FillReport, OrderCancelled, OrderCreated, OrderModified, OrderStatusChanged,
};
use crate::core::ids::{CorrelationId, OrderId};
use crate::core::money::{round_price, round_quantity, CurrencyPair};
use crate::core::order::{Fill, NewOrderParams, Order, OrderStatus, Side, TimeInForce};
use crate::external::account_manager::AccountManager;
use crate::monitoring::CoreMetrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::SystemTime;

const ALLOWED_TIF: [TimeInForce; 4] = [
    TimeInForce::Gtc,
    TimeInForce::Ioc,
    TimeInForce::Fok,
    TimeInForce::Day,
];

pub struct CreateOrderParams {
    pub user_id: String,
    pub client_order_id: Option<String>,
    pub side: Side,
    pub order_type: crate::core::order::OrderType,
    pub pair: CurrencyPair,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

pub struct ModifyOrderParams {
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    pub pair: Option<CurrencyPair>,
    pub status: Option<OrderStatus>,
}

pub struct OrderManager {
    config: OrderManagerConfig,
    orders: DashMap<OrderId, Order>,
    books: DashMap<CurrencyPair, Mutex<OrderBook>>,
    account_manager: Arc<dyn AccountManager>,
    events: EventBus,
    metrics: Option<Arc<CoreMetrics>>,
}

impl OrderManager {
    pub fn new(
        config: OrderManagerConfig,
        account_manager: Arc<dyn AccountManager>,
        events: EventBus,
        metrics: Option<Arc<CoreMetrics>>,
    ) -> Self {
        Self {
            config,
            orders: DashMap::new(),
            books: DashMap::new(),
            account_manager,
            events,
            metrics,
        }
    }

    fn open_order_count(&self, user_id: &str) -> usize {
        self.orders
            .iter()
            .filter(|entry| entry.user_id == user_id && !entry.status.is_terminal())
            .count()
    }

    fn reservation_leg(&self, params: &CreateOrderParams, estimated_price: Decimal) -> (String, Decimal) {
        match params.side {
            // Buying BASE pays QUOTE; selling BASE pays away BASE itself.
            Side::Buy => (
                params.pair.quote.clone(),
                round_price(&params.pair, params.quantity * estimated_price),
            ),
            Side::Sell => (params.pair.base.clone(), round_quantity(&params.pair, params.quantity)),
        }
    }

    /// `CreateOrder` (spec §4.1). `ask` is the best ask the caller already
    /// fetched from the Rate Provider, used only to size a market order's
    /// collateral reservation; `None` means the ask was stale (Open
    /// Question 2 — this core rejects the order rather than guessing at a
    /// fallback multiplier).
    pub async fn create_order(
        &self,
        id: OrderId,
        params: CreateOrderParams,
        ask: Option<Decimal>,
    ) -> Result<OrderId, CoreError> {
        if !self
            .config
            .supported_order_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&format!("{:?}", params.order_type)))
        {
            return Err(ValidationError::UnsupportedOrderType(format!("{:?}", params.order_type)).into());
        }
        if !ALLOWED_TIF.contains(&params.time_in_force) {
            return Err(ValidationError::UnsupportedTimeInForce(format!("{:?}", params.time_in_force)).into());
        }
        let open_count = self.open_order_count(&params.user_id);
        if open_count >= self.config.max_orders_per_user {
            return Err(ValidationError::OpenOrderCapExceeded {
                user_id: params.user_id.clone(),
                count: open_count,
                cap: self.config.max_orders_per_user,
            }
            .into());
        }

        let expires_at = compute_expiry(params.time_in_force, SystemTime::now());

        let is_market = params.order_type == crate::core::order::OrderType::Market;
        let estimated_price = if is_market {
            match ask {
                Some(ask) => ask * (Decimal::ONE + self.config.market_order_slippage_buffer),
                None => {
                    return Err(crate::core::errors::DataStaleError {
                        pair: params.pair.as_str(),
                        reason: "ask unavailable for market order reservation sizing".to_string(),
                    }
                    .into())
                }
            }
        } else {
            params.price.unwrap_or(Decimal::ZERO)
        };

        let mut order = Order::new(
            id,
            NewOrderParams {
                user_id: params.user_id.clone(),
                client_order_id: params.client_order_id.clone(),
                side: params.side,
                order_type: params.order_type,
                pair: params.pair.clone(),
                quantity: params.quantity,
                price: params.price,
                stop_price: params.stop_price,
                time_in_force: params.time_in_force,
                expires_at,
            },
            self.config.min_order_size,
            self.config.max_order_size,
        )?;

        let (currency, amount) = self.reservation_leg(&params, estimated_price);
        let reference = id.to_string();
        if let Err(err) = self
            .account_manager
            .reserve(&params.user_id, &currency, amount, &reference)
            .await
        {
            order.reject().ok();
            if let Some(metrics) = &self.metrics {
                metrics.orders_rejected_total.inc();
            }
            return Err(InsufficientFundsError {
                requested: amount.to_string(),
                available: err.to_string(),
                currency,
            }
            .into());
        }

        order.mark_submitted().map_err(CoreError::from)?;
        let correlation_id = CorrelationId::from_order(id);

        self.books
            .entry(params.pair.clone())
            .or_insert_with(|| Mutex::new(OrderBook::new()))
            .lock()
            .side_mut(params.side)
            .insert(BookEntry {
                order_id: id,
                is_market,
                price: order.price,
                created_at: order.created_at,
            });

        self.orders.insert(id, order);

        if let Some(metrics) = &self.metrics {
            metrics.orders_created_total.inc();
        }
        self.events.publish(CoreEvent::OrderCreated(OrderCreated {
            order_id: id,
            user_id: params.user_id,
            pair: params.pair,
            side: params.side,
            quantity: params.quantity,
            correlation_id,
        }));
        self.events.publish(CoreEvent::OrderStatusChanged(OrderStatusChanged {
            order_id: id,
            from: OrderStatus::Pending,
            to: OrderStatus::Submitted,
            correlation_id,
        }));

        Ok(id)
    }

    fn remove_from_book(&self, order: &Order) {
        if let Some(book) = self.books.get(&order.pair) {
            book.lock().side_mut(order.side).remove(order.id);
        }
    }

    /// `CancelOrder` (spec §4.1): idempotent; a terminal order cancels as a
    /// no-op success and any remaining reservation is released.
    pub async fn cancel_order(&self, order_id: OrderId, user_id: &str, reason: &str) -> Result<(), CoreError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or(NotFoundError::Order(order_id))?;
        if entry.user_id != user_id {
            return Err(AccessDeniedError { user_id: user_id.to_string(), order_id }.into());
        }
        if entry.status.is_terminal() {
            return Ok(());
        }

        let was_cancellable = entry.can_cancel();
        if !was_cancellable {
            return Err(StateConflictError {
                order_id,
                status: entry.status.to_string(),
                operation: "cancel".to_string(),
            }
            .into());
        }

        let from = entry.status;
        entry.cancel().map_err(CoreError::from)?;
        let remaining = entry.remaining_quantity;
        let pair = entry.pair.clone();
        let side = entry.side;
        let price = entry.price;
        let order_snapshot_price = entry.price.unwrap_or(Decimal::ZERO);
        drop(entry);

        if let Some(book) = self.books.get(&pair) {
            book.lock().side_mut(side).remove(order_id);
        }

        let (currency, amount) = match side {
            Side::Buy => (pair.quote.clone(), remaining * price.unwrap_or(order_snapshot_price)),
            Side::Sell => (pair.base.clone(), remaining),
        };
        if amount > Decimal::ZERO {
            let _ = self
                .account_manager
                .release(user_id, &currency, amount, &order_id.to_string())
                .await;
        }

        let correlation_id = CorrelationId::from_order(order_id);
        self.events.publish(CoreEvent::OrderStatusChanged(OrderStatusChanged {
            order_id,
            from,
            to: OrderStatus::Cancelled,
            correlation_id,
        }));
        self.events.publish(CoreEvent::OrderCancelled(OrderCancelled {
            order_id,
            reason: reason.to_string(),
            correlation_id,
        }));
        Ok(())
    }

    /// `ModifyOrder` (spec §4.1): permitted only while pending/submitted.
    /// Quantity changes release the old reservation and re-reserve
    /// atomically (release then reserve, re-reserving the full new amount);
    /// price/stop/tif changes reorder the book in place.
    pub async fn modify_order(
        &self,
        order_id: OrderId,
        user_id: &str,
        params: ModifyOrderParams,
    ) -> Result<(), CoreError> {
        let mut entry = self
            .orders
            .get_mut(&order_id)
            .ok_or(NotFoundError::Order(order_id))?;
        if entry.user_id != user_id {
            return Err(AccessDeniedError { user_id: user_id.to_string(), order_id }.into());
        }
        if !entry.can_modify() {
            return Err(StateConflictError {
                order_id,
                status: entry.status.to_string(),
                operation: "modify".to_string(),
            }
            .into());
        }

        if let Some(new_quantity) = params.quantity {
            let pair = entry.pair.clone();
            let side = entry.side;
            let price = entry.price.unwrap_or(Decimal::ZERO);
            let old_remaining = entry.remaining_quantity;
            let (currency, old_amount) = match side {
                Side::Buy => (pair.quote.clone(), old_remaining * price),
                Side::Sell => (pair.base.clone(), old_remaining),
            };
            let new_remaining = new_quantity - entry.filled_quantity;
            let new_amount = match side {
                Side::Buy => new_remaining * price,
                Side::Sell => new_remaining,
            };

            if old_amount > Decimal::ZERO {
                let _ = self
                    .account_manager
                    .release(user_id, &currency, old_amount, &order_id.to_string())
                    .await;
            }
            self.account_manager
                .reserve(user_id, &currency, new_amount, &order_id.to_string())
                .await
                .map_err(|err| InsufficientFundsError {
                    requested: new_amount.to_string(),
                    available: err.to_string(),
                    currency,
                })?;

            entry.original_quantity = round_quantity(&entry.pair, new_quantity);
            entry.remaining_quantity = round_quantity(&entry.pair, new_remaining);
        }
        if let Some(price) = params.price {
            entry.price = Some(round_price(&entry.pair, price));
        }
        if let Some(stop_price) = params.stop_price {
            entry.stop_price = Some(round_price(&entry.pair, stop_price));
        }
        if let Some(tif) = params.time_in_force {
            entry.time_in_force = tif;
        }
        entry.updated_at = SystemTime::now();

        let pair = entry.pair.clone();
        let side = entry.side;
        let is_market = entry.order_type == crate::core::order::OrderType::Market;
        let new_entry = BookEntry {
            order_id,
            is_market,
            price: entry.price,
            created_at: entry.created_at,
        };
        drop(entry);

        if let Some(book) = self.books.get(&pair) {
            let mut book = book.lock();
            let side_book = book.side_mut(side);
            side_book.remove(order_id);
            side_book.insert(new_entry);
        }

        self.events.publish(CoreEvent::OrderModified(OrderModified {
            order_id,
            correlation_id: CorrelationId::from_order(order_id),
        }));
        Ok(())
    }

    /// `RecordFill`, called only by the Execution Engine. Idempotent by
    /// `ExecutionId`; removes filled orders from the book and releases any
    /// residual reservation once the order reaches a terminal state.
    pub async fn record_fill(&self, report: FillReport) -> Result<(), CoreError> {
        let mut entry = self
            .orders
            .get_mut(&report.order_id)
            .ok_or(NotFoundError::Order(report.order_id))?;

        let from_status = entry.status;
        let price_improvement = compute_price_improvement(entry.side, entry.price, report.price);
        let applied = entry.apply_fill(Fill {
            execution_id: report.execution_id,
            order_id: report.order_id,
            provider_id: report.provider_id.clone(),
            quantity: report.quantity,
            price: report.price,
            timestamp: report.timestamp,
            latency_ms: 0,
            commission: report.commission,
            price_improvement,
        })?;
        if !applied {
            return Ok(());
        }

        let to_status = entry.status;
        let user_id = entry.user_id.clone();
        let pair = entry.pair.clone();
        let side = entry.side;
        let remaining = entry.remaining_quantity;
        let price = entry.price;
        let terminal = entry.status.is_terminal();
        drop(entry);

        if let Some(metrics) = &self.metrics {
            metrics.fills_recorded_total.inc();
        }

        if terminal {
            self.remove_from_book_by_ref(&pair, side, report.order_id);
            if to_status == OrderStatus::Filled && remaining > Decimal::ZERO {
                // Fully filled with rounding residue left in the reservation; release it.
                let (currency, amount) = match side {
                    Side::Buy => (pair.quote.clone(), remaining * price.unwrap_or(Decimal::ZERO)),
                    Side::Sell => (pair.base.clone(), remaining),
                };
                let _ = self
                    .account_manager
                    .release(&user_id, &currency, amount, &report.order_id.to_string())
                    .await;
            }
        }

        let correlation_id = report.correlation_id;
        if from_status != to_status {
            self.events.publish(CoreEvent::OrderStatusChanged(OrderStatusChanged {
                order_id: report.order_id,
                from: from_status,
                to: to_status,
                correlation_id,
            }));
        }

        Ok(())
    }

    fn remove_from_book_by_ref(&self, pair: &CurrencyPair, side: Side, order_id: OrderId) {
        if let Some(book) = self.books.get(pair) {
            book.lock().side_mut(side).remove(order_id);
        }
    }

    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|o| o.clone())
    }

    pub fn list_user_orders(&self, user_id: &str, filters: &OrderFilters) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .filter(|entry| filters.pair.as_ref().map_or(true, |p| &entry.pair == p))
            .filter(|entry| filters.status.map_or(true, |s| entry.status == s))
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn get_order_book_depth(&self, pair: &CurrencyPair, depth: usize) -> (Vec<BookEntry>, Vec<BookEntry>) {
        match self.books.get(pair) {
            Some(book) => {
                let book = book.lock();
                (book.buy.depth(depth), book.sell.depth(depth))
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Scheduled sweep (spec §4.1 "Expiry"): runs every
    /// `expiry_sweep_interval_secs` and expires any non-terminal order past
    /// its `expiresAt`.
    pub async fn sweep_expired(&self) {
        let now = SystemTime::now();
        let expired: Vec<OrderId> = self
            .orders
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .filter(|entry| entry.expires_at.map_or(false, |exp| exp <= now))
            .map(|entry| entry.id)
            .collect();

        for order_id in expired {
            if let Some(mut entry) = self.orders.get_mut(&order_id) {
                let from = entry.status;
                if entry.expire().is_err() {
                    continue;
                }
                let remaining = entry.remaining_quantity;
                let user_id = entry.user_id.clone();
                let pair = entry.pair.clone();
                let side = entry.side;
                let price = entry.price;
                drop(entry);

                self.remove_from_book_by_ref(&pair, side, order_id);
                let (currency, amount) = match side {
                    Side::Buy => (pair.quote.clone(), remaining * price.unwrap_or(Decimal::ZERO)),
                    Side::Sell => (pair.base.clone(), remaining),
                };
                if amount > Decimal::ZERO {
                    let _ = self
                        .account_manager
                        .release(&user_id, &currency, amount, &order_id.to_string())
                        .await;
                }

                tracing::info!(%order_id, "order expired");
                self.events.publish(CoreEvent::OrderStatusChanged(OrderStatusChanged {
                    order_id,
                    from,
                    to: OrderStatus::Expired,
                    correlation_id: CorrelationId::from_order(order_id),
                }));
            }
        }
    }
}

fn compute_price_improvement(side: Side, target_price: Option<Decimal>, exec_price: Decimal) -> Decimal {
    match target_price {
        Some(target) => match side {
            Side::Buy => target - exec_price,
            Side::Sell => exec_price - target,
        },
        None => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::ExecutionId;
    use crate::core::order::OrderType;
    use crate::external::account_manager::InMemoryAccountManager;
    use rust_decimal_macros::dec;

    fn manager() -> (OrderManager, Arc<InMemoryAccountManager>) {
        let account_manager = Arc::new(InMemoryAccountManager::new());
        let om = OrderManager::new(
            OrderManagerConfig::default(),
            account_manager.clone(),
            EventBus::default(),
            None,
        );
        (om, account_manager)
    }

    fn eur_usd() -> CurrencyPair {
        CurrencyPair::new("EUR", "USD")
    }

    fn limit_buy_params() -> CreateOrderParams {
        CreateOrderParams {
            user_id: "u1".into(),
            client_order_id: None,
            side: Side::Buy,
            order_type: OrderType::Limit,
            pair: eur_usd(),
            quantity: dec!(10_000),
            price: Some(dec!(1.1000)),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
        }
    }

    #[tokio::test]
    async fn create_order_reserves_quote_currency_for_a_limit_buy() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let id = OrderId::generate();
        om.create_order(id, limit_buy_params(), None).await.unwrap();

        assert_eq!(accounts.get_balance("u1", "USD").await, dec!(9_000));
        let order = om.get_order(id).unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);

        let (buy_depth, _) = om.get_order_book_depth(&eur_usd(), 10);
        assert_eq!(buy_depth.len(), 1);
        assert_eq!(buy_depth[0].order_id, id);
    }

    #[tokio::test]
    async fn create_order_rejects_when_funds_are_insufficient() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(100));
        let id = OrderId::generate();
        let err = om.create_order(id, limit_buy_params(), None).await;
        assert!(matches!(err, Err(CoreError::InsufficientFunds(_))));
    }

    #[tokio::test]
    async fn cancel_releases_the_full_remaining_reservation() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let id = OrderId::generate();
        om.create_order(id, limit_buy_params(), None).await.unwrap();
        assert_eq!(accounts.get_balance("u1", "USD").await, dec!(9_000));

        om.cancel_order(id, "u1", "user requested").await.unwrap();
        assert_eq!(accounts.get_balance("u1", "USD").await, dec!(20_000));
        assert_eq!(om.get_order(id).unwrap().status, OrderStatus::Cancelled);

        let (buy_depth, _) = om.get_order_book_depth(&eur_usd(), 10);
        assert!(buy_depth.is_empty());
    }

    #[tokio::test]
    async fn cancel_of_terminal_order_is_idempotent() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let id = OrderId::generate();
        om.create_order(id, limit_buy_params(), None).await.unwrap();
        om.cancel_order(id, "u1", "first").await.unwrap();
        om.cancel_order(id, "u1", "second").await.unwrap();
        assert_eq!(om.get_order(id).unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_by_a_different_user_is_denied() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let id = OrderId::generate();
        om.create_order(id, limit_buy_params(), None).await.unwrap();
        let err = om.cancel_order(id, "u2", "not mine").await;
        assert!(matches!(err, Err(CoreError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn record_fill_removes_a_fully_filled_order_from_the_book() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let id = OrderId::generate();
        om.create_order(id, limit_buy_params(), None).await.unwrap();

        om.record_fill(FillReport {
            order_id: id,
            execution_id: ExecutionId::generate(),
            provider_id: "bank_a".into(),
            quantity: dec!(10_000),
            price: dec!(1.0999),
            commission: dec!(11),
            timestamp: SystemTime::now(),
            correlation_id: CorrelationId::from_order(id),
        })
        .await
        .unwrap();

        let order = om.get_order(id).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        let (buy_depth, _) = om.get_order_book_depth(&eur_usd(), 10);
        assert!(buy_depth.is_empty());
    }

    #[tokio::test]
    async fn duplicate_fill_report_is_ignored() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let id = OrderId::generate();
        om.create_order(id, limit_buy_params(), None).await.unwrap();
        let execution_id = ExecutionId::generate();
        let report = FillReport {
            order_id: id,
            execution_id,
            provider_id: "bank_a".into(),
            quantity: dec!(4_000),
            price: dec!(1.0999),
            commission: dec!(4.4),
            timestamp: SystemTime::now(),
            correlation_id: CorrelationId::from_order(id),
        };
        om.record_fill(report.clone()).await.unwrap();
        om.record_fill(report).await.unwrap();

        let order = om.get_order(id).unwrap();
        assert_eq!(order.filled_quantity, dec!(4_000));
        assert_eq!(order.status, OrderStatus::PartialFilled);
    }

    #[tokio::test]
    async fn market_order_without_an_ask_is_rejected_as_stale() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let params = CreateOrderParams {
            order_type: OrderType::Market,
            price: None,
            ..limit_buy_params()
        };
        let err = om.create_order(OrderId::generate(), params, None).await;
        assert!(matches!(err, Err(CoreError::DataStale(_))));
    }

    #[tokio::test]
    async fn sweep_expired_expires_and_releases_reservation() {
        let (om, accounts) = manager();
        accounts.fund("u1", "USD", dec!(20_000));
        let params = CreateOrderParams {
            time_in_force: TimeInForce::Ioc,
            ..limit_buy_params()
        };
        let id = OrderId::generate();
        om.create_order(id, params, None).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        om.sweep_expired().await;

        assert_eq!(om.get_order(id).unwrap().status, OrderStatus::Expired);
        assert_eq!(accounts.get_balance("u1", "USD").await, dec!(20_000));
    }

    #[tokio::test]
    async fn open_order_cap_rejects_further_orders() {
        let accounts = Arc::new(InMemoryAccountManager::new());
        accounts.fund("u1", "USD", dec!(10_000_000));
        let mut config = OrderManagerConfig::default();
        config.max_orders_per_user = 1;
        let om = OrderManager::new(config, accounts, EventBus::default(), None);
        om.create_order(OrderId::generate(), limit_buy_params(), None)
            .await
            .unwrap();
        let err = om.create_order(OrderId::generate(), limit_buy_params(), None).await;
        assert!(matches!(err, Err(CoreError::Validation(ValidationError::OpenOrderCapExceeded { .. }))));
    }
}
