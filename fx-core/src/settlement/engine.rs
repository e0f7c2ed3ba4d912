//! Settlement Engine (spec §4.3): settlement creation from fills, netting,
//! leg processing against the Payment System, and the 60s processor tick.

use super::cycle::{business_day_offset, select_cycle};
use super::netting::{build_batch, NettingBatchStatus};
use super::settlement::{compute_legs, LegStatus, LegType, Settlement, SettlementStatus};
use crate::config::SettlementConfig;
use crate::core::errors::SettlementError;
use crate::core::events::{
    CoreEvent, EventBus, NettingGroupProcessed, SettlementCreated, SettlementFailed, SettlementProcessed,
};
use crate::core::ids::{BatchId, CorrelationId, SettlementId};
use crate::external::compliance::ComplianceEngine;
use crate::external::payment_system::{
    select_payment_method, select_priority, IncomingPaymentQuery, PaymentInstruction, PaymentSystem,
};
use crate::monitoring::CoreMetrics;
use crate::order_manager::OrderManager;
use crate::scheduler::RetryScheduler;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-currency nostro balances this core settles against. Out of scope for
/// a real treasury ledger (spec §1); seeded via `fund` the same way
/// `InMemoryAccountManager` is.
pub struct NostroLedger {
    balances: DashMap<String, Decimal>,
}

impl NostroLedger {
    pub fn new() -> Self {
        Self { balances: DashMap::new() }
    }

    pub fn fund(&self, currency: &str, amount: Decimal) {
        *self.balances.entry(currency.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    pub fn balance(&self, currency: &str) -> Decimal {
        self.balances.get(currency).map(|b| *b).unwrap_or(Decimal::ZERO)
    }

    fn try_debit(&self, currency: &str, amount: Decimal) -> bool {
        let mut entry = self.balances.entry(currency.to_string()).or_insert(Decimal::ZERO);
        if *entry < amount {
            return false;
        }
        *entry -= amount;
        true
    }

    fn credit(&self, currency: &str, amount: Decimal) {
        *self.balances.entry(currency.to_string()).or_insert(Decimal::ZERO) += amount;
    }
}

impl Default for NostroLedger {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SettlementEngine {
    config: SettlementConfig,
    order_manager: Arc<OrderManager>,
    compliance: Arc<dyn ComplianceEngine>,
    payment_system: Arc<dyn PaymentSystem>,
    nostro: NostroLedger,
    settlements: DashMap<SettlementId, SyncMutex<Settlement>>,
    retry_scheduler: RetryScheduler<SettlementId>,
    events: EventBus,
    metrics: Option<Arc<CoreMetrics>>,
    weak: std::sync::Weak<SettlementEngine>,
}

impl SettlementEngine {
    /// Returns an `Arc` rather than `Self`: retry scheduling needs a
    /// non-owning handle back to the engine, so construction goes through
    /// `Arc::new_cyclic`.
    pub fn new(
        config: SettlementConfig,
        order_manager: Arc<OrderManager>,
        compliance: Arc<dyn ComplianceEngine>,
        payment_system: Arc<dyn PaymentSystem>,
        nostro: NostroLedger,
        events: EventBus,
        metrics: Option<Arc<CoreMetrics>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            order_manager,
            compliance,
            payment_system,
            nostro,
            settlements: DashMap::new(),
            retry_scheduler: RetryScheduler::new(),
            events,
            metrics,
            weak: weak.clone(),
        })
    }

    pub fn nostro(&self) -> &NostroLedger {
        &self.nostro
    }

    /// Spawns the event-bus subscriber that creates a settlement for every
    /// `SliceExecuted` fill. Runs for the engine's lifetime.
    pub fn spawn_fill_listener(self: &Arc<Self>) {
        let engine = self.clone();
        let mut receiver = engine.events.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(CoreEvent::SliceExecuted(slice)) => {
                        engine.create_settlement_for_fill(&slice).await;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Settlement creation (spec §4.3): one settlement per fill, two legs,
    /// cycle from `select_cycle`, `settlementDate = valueDate = T+N business
    /// days from today`.
    async fn create_settlement_for_fill(&self, slice: &crate::core::events::SliceExecuted) -> Option<SettlementId> {
        let order = self.order_manager.get_order(slice.order_id)?;
        let cycle = select_cycle(&order.pair, &self.config);
        let today = chrono::Utc::now().date_naive();
        let settlement_date = business_day_offset(today, cycle.business_days());
        let legs = compute_legs(order.side, &order.pair, slice.quantity, slice.price, slice.commission);
        let gross_amount = slice.quantity * slice.price;

        let id = SettlementId::generate();
        let settlement = Settlement {
            id,
            order_id: slice.order_id,
            execution_id: slice.execution_id,
            user_id: order.user_id.clone(),
            counterparty_id: slice.provider_id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            quantity: slice.quantity,
            price: slice.price,
            gross_amount,
            commission: slice.commission,
            net_amount: gross_amount - slice.commission,
            settlement_cycle: cycle,
            settlement_date,
            value_date: settlement_date,
            status: SettlementStatus::Pending,
            legs,
            batch_id: None,
            retry_count: 0,
        };

        self.settlements.insert(id, SyncMutex::new(settlement));
        if let Some(metrics) = &self.metrics {
            metrics.settlements_created_total.inc();
        }
        self.events.publish(CoreEvent::SettlementCreated(SettlementCreated {
            settlement_id: id,
            order_id: slice.order_id,
            user_id: order.user_id,
            correlation_id: slice.correlation_id,
        }));
        Some(id)
    }

    pub fn get_settlement(&self, id: SettlementId) -> Option<Settlement> {
        self.settlements.get(&id).map(|s| s.lock().clone())
    }

    /// Processor tick (spec §4.3 "every `processorTickIntervalSecs`,
    /// collect pending settlements with `settlementDate ≤ now`, group by
    /// `(counterpartyId, settlementDate)`"). Each group is processed as a
    /// netting batch when `enableNetting` is on; a batch failure falls back
    /// to processing its settlements individually so one bad leg never
    /// blocks the rest of the group.
    pub async fn tick(&self) {
        let today = chrono::Utc::now().date_naive();
        let due: Vec<SettlementId> = self
            .settlements
            .iter()
            .filter(|entry| {
                let settlement = entry.value().lock();
                settlement.status == SettlementStatus::Pending && settlement.settlement_date <= today
            })
            .map(|entry| *entry.key())
            .collect();

        let mut groups: HashMap<(String, chrono::NaiveDate), Vec<SettlementId>> = HashMap::new();
        for id in due {
            if let Some(entry) = self.settlements.get(&id) {
                let settlement = entry.value().lock();
                groups
                    .entry((settlement.counterparty_id.clone(), settlement.settlement_date))
                    .or_default()
                    .push(id);
            }
        }

        for ((counterparty_id, settlement_date), ids) in groups {
            if self.config.enable_netting && ids.len() > 1 {
                self.process_netting_group(counterparty_id, settlement_date, ids).await;
            } else {
                for id in ids {
                    self.process_single(id).await;
                }
            }
        }
    }

    async fn process_netting_group(
        &self,
        counterparty_id: String,
        settlement_date: chrono::NaiveDate,
        ids: Vec<SettlementId>,
    ) {
        let verdict = self.compliance.check_settlement(&counterparty_id).await;
        if !verdict.approved {
            for id in &ids {
                self.reject(*id, verdict.reason.clone().unwrap_or_default()).await;
            }
            return;
        }

        let snapshots: Vec<Settlement> = ids
            .iter()
            .filter_map(|id| self.settlements.get(id).map(|s| s.value().lock().clone()))
            .collect();
        let refs: Vec<&Settlement> = snapshots.iter().collect();
        let batch_id = BatchId::generate();
        let batch = build_batch(batch_id, counterparty_id.clone(), settlement_date, &refs);

        for id in &ids {
            if let Some(entry) = self.settlements.get(id) {
                entry.value().lock().status = SettlementStatus::Processing;
            }
        }

        let batch_settlement_id = SettlementId::from_raw(batch_id.as_u128());
        let mut batch_ok = true;
        for leg in &batch.legs {
            let processed = match leg.direction {
                LegType::Pay => {
                    self.pay_leg(batch_settlement_id, &counterparty_id, &leg.currency, leg.net_amount, settlement_date)
                        .await
                }
                LegType::Receive => {
                    self.receive_leg(batch_settlement_id, &counterparty_id, &leg.currency, leg.net_amount, settlement_date)
                        .await
                }
            };
            if processed.is_err() {
                batch_ok = false;
                break;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.netting_batch_size.observe(ids.len() as f64);
        }

        if batch_ok {
            for id in &ids {
                self.mark_settled(*id, Some(batch_id)).await;
            }
            self.events.publish(CoreEvent::NettingGroupProcessed(NettingGroupProcessed {
                batch_id,
                counterparty_id,
                settlement_count: ids.len(),
                correlation_id: CorrelationId::generate(),
            }));
        } else {
            // Batch-level leg failed: fall back to per-settlement processing
            // (spec §4.3 "a batch failure falls back to individual settlement
            // processing") so unaffected settlements in the group still settle.
            for id in &ids {
                if let Some(entry) = self.settlements.get(id) {
                    entry.value().lock().status = SettlementStatus::Pending;
                }
                self.process_single(*id).await;
            }
        }
    }

    async fn process_single(&self, id: SettlementId) {
        let Some(counterparty_id) = self.settlements.get(&id).map(|s| s.value().lock().counterparty_id.clone()) else {
            return;
        };
        let verdict = self.compliance.check_settlement(&counterparty_id).await;
        if !verdict.approved {
            self.reject(id, verdict.reason.unwrap_or_default()).await;
            return;
        }

        let (legs, value_date) = match self.settlements.get(&id) {
            Some(entry) => {
                let mut settlement = entry.value().lock();
                settlement.status = SettlementStatus::Processing;
                (settlement.legs.clone(), settlement.value_date)
            }
            None => return,
        };

        // Legs already marked completed on a prior attempt are skipped so a
        // retry after a partial leg failure never pays/receives twice.
        for (index, leg) in legs.iter().enumerate() {
            if leg.status == LegStatus::Completed {
                continue;
            }
            let result = match leg.leg_type {
                LegType::Pay => self.pay_leg(id, &counterparty_id, &leg.currency, leg.amount, value_date).await,
                LegType::Receive => self.receive_leg(id, &counterparty_id, &leg.currency, leg.amount, value_date).await,
            };
            if let Err(err) = result {
                self.handle_leg_failure(id, err).await;
                return;
            }
            if let Some(entry) = self.settlements.get(&id) {
                entry.value().lock().legs[index].status = LegStatus::Completed;
            }
        }

        self.mark_settled(id, None).await;
    }

    async fn pay_leg(
        &self,
        settlement_id: SettlementId,
        counterparty_id: &str,
        currency: &str,
        amount: Decimal,
        value_date: chrono::NaiveDate,
    ) -> Result<(), SettlementError> {
        if !self.nostro.try_debit(currency, amount) {
            return Err(SettlementError::NostroInsufficient {
                settlement_id,
                currency: currency.to_string(),
            });
        }
        let instruction = PaymentInstruction {
            currency: currency.to_string(),
            amount,
            counterparty_id: counterparty_id.to_string(),
            method: select_payment_method(amount, currency),
            priority: select_priority(amount),
            value_date,
        };
        match self.payment_system.send_payment(instruction).await {
            Ok(result) if result.success => Ok(()),
            Ok(_) | Err(_) => {
                self.nostro.credit(currency, amount);
                Err(SettlementError::PaymentTransient {
                    settlement_id,
                    reason: "payment rail rejected the instruction".to_string(),
                    retry_count: 0,
                })
            }
        }
    }

    async fn receive_leg(
        &self,
        settlement_id: SettlementId,
        counterparty_id: &str,
        currency: &str,
        amount: Decimal,
        value_date: chrono::NaiveDate,
    ) -> Result<(), SettlementError> {
        let query = IncomingPaymentQuery {
            currency: currency.to_string(),
            amount,
            counterparty_id: counterparty_id.to_string(),
            expected_date: value_date,
        };
        match self.payment_system.check_incoming_payment(query).await {
            Ok(result) if result.received => {
                self.nostro.credit(currency, amount);
                Ok(())
            }
            Ok(_) => Err(SettlementError::PaymentTransient {
                settlement_id,
                reason: "incoming credit not yet received".to_string(),
                retry_count: 0,
            }),
            Err(err) => Err(SettlementError::PaymentTransient {
                settlement_id,
                reason: err.to_string(),
                retry_count: 0,
            }),
        }
    }

    /// Failure semantics (spec §4.3): compliance rejection is terminal with
    /// no retry; payment-system failure retries with backoff up to
    /// `retryAttempts`; nostro insufficiency is fatal and never retried.
    async fn handle_leg_failure(&self, id: SettlementId, error: SettlementError) {
        match error {
            SettlementError::NostroInsufficient { .. } => {
                self.fail(id, error.to_string(), false).await;
            }
            _ => {
                let retry_count = match self.settlements.get(&id) {
                    Some(entry) => {
                        let mut settlement = entry.value().lock();
                        settlement.retry_count += 1;
                        settlement.retry_count
                    }
                    None => return,
                };
                if retry_count > self.config.retry_attempts {
                    self.fail(id, error.to_string(), false).await;
                    return;
                }
                self.fail(id, error.to_string(), true).await;
                let delay = Duration::from_secs(self.config.retry_delay_secs * (retry_count as u64 + 1));
                let engine = self.weak.clone();
                self.retry_scheduler.schedule(id, delay, move || async move {
                    if let Some(engine) = engine.upgrade() {
                        if let Some(entry) = engine.settlements.get(&id) {
                            entry.value().lock().status = SettlementStatus::Pending;
                        }
                    }
                });
            }
        }
    }

    async fn reject(&self, id: SettlementId, reason: String) {
        self.fail(id, reason, false).await;
        if let Some(entry) = self.settlements.get(&id) {
            entry.value().lock().status = SettlementStatus::Rejected;
        }
    }

    async fn fail(&self, id: SettlementId, reason: String, retryable: bool) {
        if let Some(entry) = self.settlements.get(&id) {
            let mut settlement = entry.value().lock();
            if !retryable {
                settlement.status = SettlementStatus::Failed;
            }
            for leg in settlement.legs.iter_mut() {
                if leg.status == LegStatus::Pending {
                    leg.status = LegStatus::Failed;
                }
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.settlements_failed_total.with_label_values(&[if retryable { "retry" } else { "fatal" }]).inc();
        }
        self.events.publish(CoreEvent::SettlementFailed(SettlementFailed {
            settlement_id: id,
            reason,
            retryable,
            correlation_id: CorrelationId::generate(),
        }));
    }

    async fn mark_settled(&self, id: SettlementId, batch_id: Option<BatchId>) {
        if let Some(entry) = self.settlements.get(&id) {
            let mut settlement = entry.value().lock();
            settlement.status = SettlementStatus::Settled;
            settlement.batch_id = batch_id;
            for leg in settlement.legs.iter_mut() {
                leg.status = LegStatus::Completed;
            }
        }
        self.events.publish(CoreEvent::SettlementProcessed(SettlementProcessed {
            settlement_id: id,
            batch_id,
            correlation_id: CorrelationId::generate(),
        }));
    }
}
