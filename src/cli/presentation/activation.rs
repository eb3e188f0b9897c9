//! Activation presentation: audit table and run summary.

use crate::activation::{AuditEntry, AuditOutcome};
use crate::pipeline::RunReport;
use crate::platform::EntityStatus;
use owo_colors::OwoColorize;

pub fn format_audit_table(audit: &[AuditEntry]) -> String {
    if audit.is_empty() {
        return "No status decisions.".to_string();
    }
    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Entity", "Id", "Status", "Outcome"]);
    for entry in audit {
        let status = match entry.status {
            EntityStatus::Active => entry.status.green().to_string(),
            EntityStatus::Paused => entry.status.yellow().to_string(),
        };
        let outcome = match entry.outcome {
            AuditOutcome::Skipped => entry.outcome.as_str().dimmed().to_string(),
            _ => entry.outcome.as_str().to_string(),
        };
        table.add_row(vec![
            entry.kind.short_name().to_string(),
            entry.id.clone(),
            status,
            outcome,
        ]);
    }
    table.to_string()
}

pub fn format_run_report(report: &RunReport, audit: &[AuditEntry], dry_run: bool) -> String {
    let verb = if dry_run { "would change" } else { "changed" };
    format!(
        "{}\nFeed rows: {}, {} {} entit{}",
        format_audit_table(audit),
        report.feed_rows,
        verb,
        report.mutated,
        if report.mutated == 1 { "y" } else { "ies" }
    )
}
