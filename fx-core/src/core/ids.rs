//! Identifier types shared across the Order Manager, Execution Engine,
//! Settlement Engine, and Analytics Engine.
//!
//! Every id packs `[timestamp:64][random:32][counter:32]` into a u128, the
//! same layout the upstream market-making core uses for `OrderId`, so that
//! ids sort roughly by creation order and collisions across threads require
//! both a timestamp tie and a counter wraparound.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

fn generate_packed_id() -> u128 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random_part: u32 = rand::random();
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    ((timestamp as u128) << 64) | ((random_part as u128) << 32) | (counter as u128)
}

macro_rules! packed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u128);

        impl $name {
            pub fn generate() -> Self {
                Self(generate_packed_id())
            }

            pub const fn from_raw(raw: u128) -> Self {
                Self(raw)
            }

            pub const fn as_u128(&self) -> u128 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{:032x}", $prefix, self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }
    };
}

packed_id!(OrderId, "ord");
packed_id!(ExecutionId, "exe");
packed_id!(SettlementId, "stl");
packed_id!(BatchId, "bat");

/// Correlation id threaded through the order → slice → fill → settlement →
/// position-update chain so every emitted event can be traced back to its
/// origin (spec §7: "structured event with correlation id").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u128);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(generate_packed_id())
    }

    pub fn from_order(order_id: OrderId) -> Self {
        Self(order_id.as_u128())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corr-{:032x}", self.0)
    }
}

/// Opaque user identifier, forwarded to the external Account Manager.
pub type UserId = String;

/// Opaque liquidity-provider / counterparty identifier.
pub type ProviderId = String;
pub type CounterpartyId = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_rapid_generation() {
        let ids: Vec<OrderId> = (0..1000).map(|_| OrderId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn display_is_stable_and_prefixed() {
        let id = OrderId::from_raw(1);
        assert_eq!(format!("{id}"), "ord-00000000000000000000000000000001");
    }
}
