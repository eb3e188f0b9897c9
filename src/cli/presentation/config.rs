//! Configuration presentation: validation results and rule checks.

use crate::config::ValidationError;
use owo_colors::OwoColorize;

pub fn format_validation_result(errors: &[ValidationError], feeds_checked: bool) -> String {
    if errors.is_empty() {
        let scope = if feeds_checked {
            "configuration and feed columns"
        } else {
            "configuration"
        };
        return format!("{} {} valid", "Validation passed:".green(), scope);
    }
    let mut s = format!(
        "{} {} problem(s)",
        "Validation failed:".red(),
        errors.len()
    );
    for e in errors {
        s.push_str(&format!("\n  - {}", e));
    }
    s
}

/// Render a rule check. `values` holds the row name and the evaluated value or error per row.
pub fn format_rule_check(condition: &str, values: &[(String, Result<String, String>)]) -> String {
    let mut s = format!("Condition is valid: {}", condition.bold());
    if values.is_empty() {
        return s;
    }
    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Row", "Value"]);
    for (row, value) in values {
        let cell = match value {
            Ok(v) => v.clone(),
            Err(e) => format!("error: {}", e),
        };
        table.add_row(vec![row.as_str(), cell.as_str()]);
    }
    s.push('\n');
    s.push_str(&table.to_string());
    s
}
