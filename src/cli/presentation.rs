//! CLI presentation: text and json formatters per command family.

mod activation;
mod config;
mod feeds;
mod generate;

pub use activation::{format_audit_table, format_run_report};
pub use config::{format_rule_check, format_validation_result};
pub use feeds::{format_feed_json, format_feed_preview};
pub use generate::format_generate_report;
