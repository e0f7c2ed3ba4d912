//! Execution Engine (spec §4.2): slicing algorithms, provider scoring, the
//! per-order execution context, and the 100ms dispatcher that ties them
//! together.

pub mod algorithms;
pub mod context;
pub mod engine;
pub mod scoring;

pub use algorithms::{Algorithm, Urgency};
pub use context::{ExecutionContext, ExecutionStatus};
pub use engine::{ExecuteOptions, ExecutionEngine};
