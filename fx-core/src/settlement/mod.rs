//! Settlement Engine (spec §4.3): settlement creation off fills, netting,
//! leg processing against the Payment System, and retry/backoff.

pub mod cycle;
pub mod engine;
pub mod netting;
pub mod settlement;

pub use cycle::{business_day_offset, select_cycle};
pub use engine::{NostroLedger, SettlementEngine};
pub use netting::{net_legs, NetLeg, NettingBatch, NettingBatchStatus};
pub use settlement::{Leg, LegStatus, LegType, Settlement, SettlementCycle, SettlementStatus};
