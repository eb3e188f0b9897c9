//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to the pipeline.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{command_name, is_mutating};
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_audit_table, format_feed_json, format_feed_preview, format_generate_report,
    format_rule_check, format_run_report, format_validation_result,
};
pub use route::RunContext;
