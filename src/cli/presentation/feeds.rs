//! Feed presentation: joined feed preview as a table or json.

use crate::error::ApiError;
use crate::rowset::{value_text, RowSet};

pub fn format_feed_preview(feed: &RowSet, limit: usize) -> String {
    if feed.is_empty() {
        return "Feed is empty.".to_string();
    }
    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(feed.columns().to_vec());
    for row in feed.iter().take(limit) {
        table.add_row(
            feed.columns()
                .iter()
                .map(|column| row.get(column).map(value_text).unwrap_or_default())
                .collect::<Vec<_>>(),
        );
    }
    let mut s = table.to_string();
    s.push_str(&format!(
        "\nRows: {} (showing {}), columns: {}",
        feed.row_count(),
        feed.row_count().min(limit),
        feed.columns().len()
    ));
    s
}

pub fn format_feed_json(feed: &RowSet, limit: usize) -> Result<String, ApiError> {
    let rows: Vec<_> = feed.iter().take(limit).collect();
    let out = serde_json::json!({ "rows": rows, "total": feed.row_count() });
    serde_json::to_string_pretty(&out).map_err(|e| ApiError::FormatError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed() -> RowSet {
        RowSet::from_json_values(vec![
            json!({"name": "Moscow", "temp": 25}),
            json!({"name": "SPB", "temp": 12}),
        ])
        .unwrap()
    }

    #[test]
    fn test_preview_respects_limit() {
        let out = format_feed_preview(&feed(), 1);
        assert!(out.contains("Moscow"));
        assert!(!out.contains("SPB"));
        assert!(out.contains("Rows: 2 (showing 1), columns: 2"));
    }

    #[test]
    fn test_json_output() {
        let out = format_feed_json(&feed(), 10).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["total"], json!(2));
        assert_eq!(parsed["rows"][1]["name"], json!("SPB"));
    }
}
