//! Compliance/Risk client contract (spec §6): optional, external,
//! black-box. `CheckSettlement` is the only call this core currently
//! drives (`AssessOrderRisk`/`CheckOrderCompliance` are declared for
//! interface completeness but the Order Manager treats a `None` veto
//! engine as "approve everything", matching spec §1's "compliance/risk
//! veto engines... are external black-box evaluators").

use async_trait::async_trait;
use dashmap::DashSet;

#[derive(Debug, Clone)]
pub struct ComplianceVerdict {
    pub approved: bool,
    pub reason: Option<String>,
}

#[async_trait]
pub trait ComplianceEngine: Send + Sync {
    async fn assess_order_risk(&self, user_id: &str, pair: &str) -> ComplianceVerdict;
    async fn check_order_compliance(&self, user_id: &str, pair: &str) -> ComplianceVerdict;
    async fn check_settlement(&self, counterparty_id: &str) -> ComplianceVerdict;
}

/// Approves everything except counterparties explicitly sanctioned via
/// `sanction`, enough to drive spec §8 scenario 5.
pub struct InMemoryComplianceEngine {
    sanctioned: DashSet<String>,
}

impl InMemoryComplianceEngine {
    pub fn new() -> Self {
        Self {
            sanctioned: DashSet::new(),
        }
    }

    pub fn sanction(&self, counterparty_id: &str) {
        self.sanctioned.insert(counterparty_id.to_string());
    }
}

impl Default for InMemoryComplianceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComplianceEngine for InMemoryComplianceEngine {
    async fn assess_order_risk(&self, _user_id: &str, _pair: &str) -> ComplianceVerdict {
        ComplianceVerdict {
            approved: true,
            reason: None,
        }
    }

    async fn check_order_compliance(&self, _user_id: &str, _pair: &str) -> ComplianceVerdict {
        ComplianceVerdict {
            approved: true,
            reason: None,
        }
    }

    async fn check_settlement(&self, counterparty_id: &str) -> ComplianceVerdict {
        if self.sanctioned.contains(counterparty_id) {
            ComplianceVerdict {
                approved: false,
                reason: Some("counterparty sanctioned".to_string()),
            }
        } else {
            ComplianceVerdict {
                approved: true,
                reason: None,
            }
        }
    }
}
