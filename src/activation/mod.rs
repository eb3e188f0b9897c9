//! Activation
//!
//! Runtime path: flips insertion orders and line items of a live campaign between Active and
//! Paused so that only the effective rule of each feed row runs.

pub mod audit;
pub mod engine;

pub use audit::{AuditEntry, AuditOutcome};
pub use engine::{ActivationEngine, ActivationOptions};
