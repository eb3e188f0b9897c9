//! Generation presentation: per-level summary of a generated archive.

use crate::pipeline::GenerateReport;

pub fn format_generate_report(report: &GenerateReport) -> String {
    use comfy_table::Table;
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Level", "Total", "Reused", "Created", "Retired"]);
    for (kind, counts) in &report.counts {
        table.add_row(vec![
            kind.file_stem().to_string(),
            counts.total.to_string(),
            counts.reused.to_string(),
            counts.created.to_string(),
            counts.retired.to_string(),
        ]);
    }
    format!(
        "Generated from {} feed row(s): {}\n{}",
        report.feed_rows,
        report.path.display(),
        table
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::LevelCounts;
    use crate::sdf::{EntityKind, SdfStructure};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_report_lists_levels() {
        let mut counts = BTreeMap::new();
        counts.insert(
            EntityKind::InsertionOrder,
            LevelCounts {
                total: 4,
                reused: 2,
                created: 2,
                retired: 0,
            },
        );
        let report = GenerateReport {
            structure: SdfStructure::default(),
            path: PathBuf::from("out/sdf.zip"),
            feed_rows: 2,
            counts,
        };
        let out = format_generate_report(&report);
        assert!(out.contains("Generated from 2 feed row(s): out/sdf.zip"));
        assert!(out.contains("InsertionOrders"));
    }
}
