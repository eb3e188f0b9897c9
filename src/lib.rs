//! Triggerator: Rule-Driven Campaign Generation and Activation
//!
//! Builds a bulk-format campaign structure from a template campaign and a joined data feed, one
//! branch per feed row and rule, and keeps a live campaign aligned with whichever rule currently
//! matches each row by pausing and activating its insertion orders and line items.

pub mod activation;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod pipeline;
pub mod platform;
pub mod rowset;
pub mod rules;
pub mod sdf;
