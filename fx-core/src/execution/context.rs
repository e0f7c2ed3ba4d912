//! Per-parent-order execution context (spec §4.2 "Execution context").

use crate::core::ids::{ExecutionId, OrderId};
use crate::core::money::CurrencyPair;
use crate::core::order::Side;
use crate::execution::algorithms::Algorithm;
use rust_decimal::Decimal;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Timeout,
    Error,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutedSlice {
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
}

pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub order_id: OrderId,
    pub pair: CurrencyPair,
    pub side: Side,
    pub limit_price: Option<Decimal>,
    pub algorithm: Algorithm,
    pub max_slippage: Decimal,
    pub time_limit: Duration,
    pub preferred_providers: Vec<String>,

    pub remaining: Decimal,
    pub executions: Vec<ExecutedSlice>,
    pub average_price: Decimal,
    pub slippage: Decimal,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub status: ExecutionStatus,
    pub consecutive_failures: u32,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: ExecutionId,
        order_id: OrderId,
        pair: CurrencyPair,
        side: Side,
        limit_price: Option<Decimal>,
        algorithm: Algorithm,
        total_quantity: Decimal,
        max_slippage: Decimal,
        time_limit: Duration,
        preferred_providers: Vec<String>,
    ) -> Self {
        Self {
            execution_id,
            order_id,
            pair,
            side,
            limit_price,
            algorithm,
            max_slippage,
            time_limit,
            preferred_providers,
            remaining: total_quantity,
            executions: Vec::new(),
            average_price: Decimal::ZERO,
            slippage: Decimal::ZERO,
            start_time: SystemTime::now(),
            end_time: None,
            status: ExecutionStatus::Pending,
            consecutive_failures: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        SystemTime::now().duration_since(self.start_time).unwrap_or_default()
    }

    pub fn time_remaining(&self) -> Duration {
        self.time_limit.saturating_sub(self.elapsed())
    }

    /// First fill's price is the benchmark `slippage` is measured against
    /// (spec §4.2 "slippage vs first fill as benchmark").
    pub fn benchmark_price(&self) -> Option<Decimal> {
        self.executions.first().map(|e| e.price)
    }

    pub fn record_slice(&mut self, slice: ExecutedSlice) {
        self.remaining = (self.remaining - slice.quantity).max(Decimal::ZERO);
        let filled_notional: Decimal = self.executions.iter().map(|e| e.quantity * e.price).sum::<Decimal>()
            + slice.quantity * slice.price;
        let total_quantity: Decimal =
            self.executions.iter().map(|e| e.quantity).sum::<Decimal>() + slice.quantity;
        self.executions.push(slice);
        if !total_quantity.is_zero() {
            self.average_price = filled_notional / total_quantity;
        }
        if let Some(benchmark) = self.benchmark_price() {
            self.slippage = match self.side {
                Side::Buy => self.average_price - benchmark,
                Side::Sell => benchmark - self.average_price,
            };
        }
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.end_time = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            ExecutionId::generate(),
            OrderId::generate(),
            CurrencyPair::new("EUR", "USD"),
            Side::Buy,
            None,
            Algorithm::Vwap,
            dec!(10_000),
            dec!(0.005),
            Duration::from_secs(30),
            Vec::new(),
        )
    }

    #[test]
    fn record_slice_recomputes_weighted_average_and_slippage() {
        let mut context = ctx();
        context.record_slice(ExecutedSlice {
            quantity: dec!(5_000),
            price: dec!(1.1000),
            commission: dec!(5.5),
        });
        context.record_slice(ExecutedSlice {
            quantity: dec!(5_000),
            price: dec!(1.1010),
            commission: dec!(5.505),
        });
        assert_eq!(context.remaining, Decimal::ZERO);
        assert_eq!(context.average_price, dec!(1.1005));
        assert_eq!(context.slippage, dec!(0.0005));
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let mut context = ctx();
        context.record_failure();
        context.record_failure();
        assert_eq!(context.consecutive_failures, 2);
        context.record_slice(ExecutedSlice {
            quantity: dec!(1_000),
            price: dec!(1.1),
            commission: dec!(1.1),
        });
        assert_eq!(context.consecutive_failures, 0);
    }
}
