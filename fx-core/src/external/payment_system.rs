//! Payment System client contract (spec §4.3, §6): `SendPayment` /
//! `CheckIncomingPayment`, plus the method/priority selection rules.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    SwiftWire,
    Rtgs,
    CorrespondentBank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PaymentPriority {
    Low,
    Normal,
    High,
}

/// Spec §4.3 "Payment method selection": amount-based thresholds then a
/// currency allow-list for RTGS-eligible currencies.
pub fn select_payment_method(amount: Decimal, currency: &str) -> PaymentMethod {
    if amount > Decimal::from(1_000_000) {
        PaymentMethod::SwiftWire
    } else if matches!(currency, "USD" | "EUR" | "GBP") {
        PaymentMethod::Rtgs
    } else {
        PaymentMethod::CorrespondentBank
    }
}

pub fn select_priority(amount: Decimal) -> PaymentPriority {
    if amount > Decimal::from(10_000_000) {
        PaymentPriority::High
    } else if amount > Decimal::from(1_000_000) {
        PaymentPriority::Normal
    } else {
        PaymentPriority::Low
    }
}

#[derive(Debug, Clone)]
pub struct PaymentInstruction {
    pub currency: String,
    pub amount: Decimal,
    pub counterparty_id: String,
    pub method: PaymentMethod,
    pub priority: PaymentPriority,
    pub value_date: chrono::NaiveDate,
}

#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub success: bool,
    pub payment_id: String,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct IncomingPaymentQuery {
    pub currency: String,
    pub amount: Decimal,
    pub counterparty_id: String,
    pub expected_date: chrono::NaiveDate,
}

#[derive(Debug, Clone)]
pub struct IncomingPaymentResult {
    pub received: bool,
    pub payment_id: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentSystemError {
    #[error("payment rail rejected instruction: {0}")]
    Rejected(String),
    #[error("payment rail transient failure: {0}")]
    Transient(String),
}

#[async_trait]
pub trait PaymentSystem: Send + Sync {
    async fn send_payment(
        &self,
        instruction: PaymentInstruction,
    ) -> Result<PaymentResult, PaymentSystemError>;

    async fn check_incoming_payment(
        &self,
        query: IncomingPaymentQuery,
    ) -> Result<IncomingPaymentResult, PaymentSystemError>;
}

/// In-memory payment rail: pay legs always succeed (unless the counterparty
/// is marked as failing), incoming credits are considered received once a
/// matching pay leg for the mirrored currency/counterparty has been
/// recorded — good enough to drive the netting scenarios of spec §8.
pub struct InMemoryPaymentSystem {
    failing_counterparties: DashMap<String, ()>,
    received: DashMap<(String, String), Decimal>,
}

impl InMemoryPaymentSystem {
    pub fn new() -> Self {
        Self {
            failing_counterparties: DashMap::new(),
            received: DashMap::new(),
        }
    }

    pub fn mark_failing(&self, counterparty_id: &str) {
        self.failing_counterparties.insert(counterparty_id.to_string(), ());
    }

    /// Test hook: pretend an incoming credit for (counterparty, currency)
    /// of `amount` has arrived.
    pub fn simulate_incoming(&self, counterparty_id: &str, currency: &str, amount: Decimal) {
        *self
            .received
            .entry((counterparty_id.to_string(), currency.to_string()))
            .or_insert(Decimal::ZERO) += amount;
    }
}

impl Default for InMemoryPaymentSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentSystem for InMemoryPaymentSystem {
    async fn send_payment(
        &self,
        instruction: PaymentInstruction,
    ) -> Result<PaymentResult, PaymentSystemError> {
        if self.failing_counterparties.contains_key(&instruction.counterparty_id) {
            return Err(PaymentSystemError::Transient(format!(
                "rail unavailable for {}",
                instruction.counterparty_id
            )));
        }
        Ok(PaymentResult {
            success: true,
            payment_id: format!("pmt-{}-{}", instruction.counterparty_id, instruction.currency),
            reference: format!("{:?}", instruction.method),
        })
    }

    async fn check_incoming_payment(
        &self,
        query: IncomingPaymentQuery,
    ) -> Result<IncomingPaymentResult, PaymentSystemError> {
        let key = (query.counterparty_id.clone(), query.currency.clone());
        let mut entry = self.received.entry(key).or_insert(Decimal::ZERO);
        if *entry >= query.amount {
            *entry -= query.amount;
            Ok(IncomingPaymentResult {
                received: true,
                payment_id: Some(format!("in-{}-{}", query.counterparty_id, query.currency)),
                reference: Some("matched".to_string()),
            })
        } else {
            Ok(IncomingPaymentResult {
                received: false,
                payment_id: None,
                reference: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_amount_uses_swift_wire() {
        assert_eq!(
            select_payment_method(Decimal::from(2_000_000), "USD"),
            PaymentMethod::SwiftWire
        );
    }

    #[test]
    fn major_currency_under_threshold_uses_rtgs() {
        assert_eq!(select_payment_method(Decimal::from(500_000), "EUR"), PaymentMethod::Rtgs);
    }

    #[test]
    fn minor_currency_falls_back_to_correspondent_bank() {
        assert_eq!(
            select_payment_method(Decimal::from(500_000), "ZAR"),
            PaymentMethod::CorrespondentBank
        );
    }

    #[test]
    fn priority_thresholds() {
        assert_eq!(select_priority(Decimal::from(20_000_000)), PaymentPriority::High);
        assert_eq!(select_priority(Decimal::from(5_000_000)), PaymentPriority::Normal);
        assert_eq!(select_priority(Decimal::from(100)), PaymentPriority::Low);
    }
}
