//! Domain error kinds shared by all four engines (spec §7).
//!
//! Each variant corresponds to one of the error kinds spec.md names, not to
//! an implementation detail. Validation/access errors propagate to the
//! caller unchanged; provider/payment errors are recovered inside the
//! Execution/Settlement Engines per their own policy and only their
//! terminal outcomes surface here.

use crate::core::ids::{ExecutionId, OrderId, SettlementId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported order type {0:?}")]
    UnsupportedOrderType(String),
    #[error("quantity {quantity} outside allowed range [{min}, {max}]")]
    QuantityOutOfRange {
        quantity: String,
        min: String,
        max: String,
    },
    #[error("currency pair {0:?} must contain '/'")]
    MalformedCurrencyPair(String),
    #[error("stop fields required for order type {0:?}")]
    MissingStopFields(String),
    #[error("stop_limit ordering rule violated: side={side:?} stop={stop} limit={limit}")]
    InvalidStopLimitOrdering {
        side: String,
        stop: String,
        limit: String,
    },
    #[error("user {user_id} already has {count} open orders (cap {cap})")]
    OpenOrderCapExceeded {
        user_id: String,
        count: usize,
        cap: usize,
    },
    #[error("time in force {0:?} is not in the allowed set")]
    UnsupportedTimeInForce(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("insufficient funds: requested {requested} available {available} currency {currency}")]
pub struct InsufficientFundsError {
    pub requested: String,
    pub available: String,
    pub currency: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("order {0} not found")]
    Order(OrderId),
    #[error("settlement {0} not found")]
    Settlement(SettlementId),
    #[error("execution {0} not found")]
    Execution(ExecutionId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("user {user_id} does not own order {order_id}")]
pub struct AccessDeniedError {
    pub user_id: String,
    pub order_id: OrderId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operation {operation:?} not permitted while order {order_id} is {status}")]
pub struct StateConflictError {
    pub order_id: OrderId,
    pub status: String,
    pub operation: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider {provider_id} returned an error: {reason}")]
    Rejected { provider_id: String, reason: String },
    #[error("provider {provider_id} timed out after {elapsed_ms}ms")]
    Timeout { provider_id: String, elapsed_ms: u64 },
    #[error("quote slippage {observed} exceeds max {max_allowed}")]
    SlippageExceeded { observed: String, max_allowed: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("settlement {settlement_id} rejected by compliance: {reason}")]
    ComplianceRejected {
        settlement_id: SettlementId,
        reason: String,
    },
    #[error("payment system failure for settlement {settlement_id}: {reason} (retry {retry_count})")]
    PaymentTransient {
        settlement_id: SettlementId,
        reason: String,
        retry_count: u32,
    },
    #[error("nostro balance insufficient for settlement {settlement_id} currency {currency}")]
    NostroInsufficient {
        settlement_id: SettlementId,
        currency: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("stale or missing rate for {pair}: {reason}")]
pub struct DataStaleError {
    pub pair: String,
    pub reason: String,
}

/// Top-level error aggregate returned by public engine operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InsufficientFunds(#[from] InsufficientFundsError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    AccessDenied(#[from] AccessDeniedError),
    #[error(transparent)]
    StateConflict(#[from] StateConflictError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    DataStale(#[from] DataStaleError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
