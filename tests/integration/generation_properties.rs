//! Property tests for expansion counts and regeneration

use super::test_utils::{display_state, display_template, flight, ADVERTISER};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use triggerator::config::RuleInfo;
use triggerator::rowset::RowSet;
use triggerator::sdf::template::NameTemplates;
use triggerator::sdf::{
    read_archive_bytes, write_archive_bytes, CampaignStructureGenerator, EntityKind,
    GenerationContext, GenerationOptions, GeneratorConfig,
};

fn config(io_template: &str, rules: usize) -> GeneratorConfig {
    let rules = (0..rules)
        .map(|i| {
            let mut rule = RuleInfo::new(format!("Rule{}", i), format!("temp >= {}", i));
            rule.display_state = Some(display_state("1/day"));
            rule
        })
        .collect();
    GeneratorConfig {
        templates: NameTemplates {
            io: Some(io_template.to_string()),
            li: Some("{base_name}-{row_name}-{rule_name}".to_string()),
            ..Default::default()
        },
        name_column: "name".to_string(),
        rules,
        campaign_name: Some("Weather".to_string()),
        ..Default::default()
    }
}

fn feed(rows: usize) -> RowSet {
    RowSet::from_json_values(
        (0..rows)
            .map(|i| json!({"name": format!("City{}", i), "temp": i}))
            .collect(),
    )
    .unwrap()
}

fn options() -> GenerationOptions {
    let (start, end) = flight();
    GenerationOptions {
        start_date: Some(start),
        end_date: Some(end),
        now: Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap(),
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn prop_counts_follow_axes(rows in 1usize..6, rules in 1usize..4, axes in 0usize..3) {
        let io_template = [
            "{base_name}",
            "{base_name}-{row_name}",
            "{base_name}-{row_name}-{rule_name}",
        ][axes];
        let expected_ios = [1, rows, rows * rules][axes];
        let config = config(io_template, rules);
        let feed = feed(rows);
        let template = display_template();
        let sdf = CampaignStructureGenerator::new(&config, &feed, &template, None, options())
            .generate()
            .unwrap();
        prop_assert_eq!(sdf.count(EntityKind::InsertionOrder), expected_ios);
        prop_assert_eq!(sdf.count(EntityKind::LineItem), rows * rules);
    }

    #[test]
    fn prop_regeneration_creates_nothing(rows in 1usize..6, rules in 1usize..4) {
        let config = config("{base_name}-{row_name}-{rule_name}", rules);
        let feed = feed(rows);
        let template = display_template();
        let first = CampaignStructureGenerator::new(&config, &feed, &template, None, options())
            .generate()
            .unwrap();
        let first = read_archive_bytes(&write_archive_bytes(&first).unwrap(), ADVERTISER).unwrap();
        let mut ctx = GenerationContext::new();
        CampaignStructureGenerator::new(&config, &feed, &template, Some(&first), options())
            .generate_in(&mut ctx)
            .unwrap();
        for kind in [EntityKind::InsertionOrder, EntityKind::LineItem] {
            prop_assert_eq!(ctx.created(kind), 0);
            prop_assert_eq!(ctx.retired(kind), 0);
            prop_assert_eq!(ctx.reused(kind), first.count(kind));
        }
    }
}
