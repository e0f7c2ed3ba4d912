//! Typed pub/sub between OM → EE → SE → AE.
//!
//! Design Note 1 replaces the source's dynamic event emitter with closed
//! sum types delivered over `tokio::sync::broadcast` channels: every event
//! kind in spec §6 has its own payload struct, subscribers register at
//! component boundaries, and delivery is at-least-once for the lifetime of
//! the process (consumers dedupe fills by `ExecutionId`).

use crate::core::ids::{
    BatchId, CorrelationId, ExecutionId, OrderId, ProviderId, SettlementId, UserId,
};
use crate::core::money::CurrencyPair;
use crate::core::order::{OrderStatus, Side};
use rust_decimal::Decimal;
use std::time::SystemTime;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub pair: CurrencyPair,
    pub side: Side,
    pub quantity: Decimal,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct OrderModified {
    pub order_id: OrderId,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: String,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct SliceExecuted {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub provider_id: ProviderId,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub price_improvement: Decimal,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct ExecutionStarted {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub algorithm: String,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct ExecutionCompleted {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub average_price: Decimal,
    pub slippage: Decimal,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct ExecutionTimeout {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub filled_quantity: Decimal,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct ExecutionError {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub reason: String,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct SettlementCreated {
    pub settlement_id: SettlementId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct SettlementProcessed {
    pub settlement_id: SettlementId,
    pub batch_id: Option<BatchId>,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct NettingGroupProcessed {
    pub batch_id: BatchId,
    pub counterparty_id: String,
    pub settlement_count: usize,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct SettlementFailed {
    pub settlement_id: SettlementId,
    pub reason: String,
    pub retryable: bool,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone)]
pub struct PnlCalculated {
    pub user_id: UserId,
    pub total_pnl: Decimal,
    pub calculated_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct TradeAnalyzed {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone)]
pub struct DailyReportGenerated {
    pub user_count: usize,
    pub generated_at: SystemTime,
}

/// Fill reported by the Execution Engine back to the Order Manager.
/// Not one of spec §6's published event names (it is OM's own input, not a
/// subscriber-facing event), but typed here alongside the rest so both
/// sides of the OM/EE boundary share one vocabulary.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order_id: OrderId,
    pub execution_id: ExecutionId,
    pub provider_id: ProviderId,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub timestamp: SystemTime,
    pub correlation_id: CorrelationId,
}

/// Every event kind spec §6 names, wrapped as a single sum type for the
/// process-wide observability channel. Component-to-component handoff
/// (e.g. OM → EE, EE → OM, OM → SE, OM/SE → AE) uses the narrower payload
/// types above directly; `CoreEvent` is the type subscribers who want
/// "everything" (the monitoring/alerting layer) receive.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    OrderCreated(OrderCreated),
    OrderStatusChanged(OrderStatusChanged),
    OrderModified(OrderModified),
    OrderCancelled(OrderCancelled),
    SliceExecuted(SliceExecuted),
    ExecutionStarted(ExecutionStarted),
    ExecutionCompleted(ExecutionCompleted),
    ExecutionTimeout(ExecutionTimeout),
    ExecutionError(ExecutionError),
    SettlementCreated(SettlementCreated),
    SettlementProcessed(SettlementProcessed),
    NettingGroupProcessed(NettingGroupProcessed),
    SettlementFailed(SettlementFailed),
    PnlCalculated(PnlCalculated),
    TradeAnalyzed(TradeAnalyzed),
    DailyReportGenerated(DailyReportGenerated),
}

/// Process-wide broadcast bus. One sender is held by each engine; every
/// other component (and the monitoring layer) subscribes with `.subscribe()`.
/// This is the one intentionally process-global piece of state (Design
/// Note 5): initialized at boot by `EventBus::new`, torn down when the last
/// handle is dropped at shutdown.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: CoreEvent) {
        // A lagging/absent subscriber must never block or crash the publisher.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
