//! Campaign structure expansion through the archive format

use super::test_utils::{display_state, display_template, flight, warm_cold_rules, ADVERTISER};
use chrono::{TimeZone, Utc};
use serde_json::json;
use triggerator::error::ApiError;
use triggerator::rowset::RowSet;
use triggerator::sdf::template::NameTemplates;
use triggerator::sdf::{
    read_archive_bytes, write_archive_bytes, CampaignStructureGenerator, EntityKind,
    GenerationContext, GenerationOptions, GeneratorConfig, SdfStructure,
};

fn feed() -> RowSet {
    RowSet::from_json_values(vec![
        json!({"name": "Moscow", "temp": 25}),
        json!({"name": "SPB", "temp": -5}),
        json!({"name": "Kazan", "temp": 3}),
    ])
    .unwrap()
}

fn config(io_template: &str) -> GeneratorConfig {
    GeneratorConfig {
        templates: NameTemplates {
            io: Some(io_template.to_string()),
            li: Some("{base_name}-{row_name}-{rule_name}".to_string()),
            ..Default::default()
        },
        name_column: "name".to_string(),
        feed_names: vec!["main".to_string()],
        rules: warm_cold_rules(),
        campaign_name: Some("Weather".to_string()),
        ..Default::default()
    }
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

/// Generate and hand back what an import of the archive would read.
fn generate(config: &GeneratorConfig, current: Option<&SdfStructure>) -> SdfStructure {
    let feed = feed();
    let template = display_template();
    let generated = CampaignStructureGenerator::new(config, &feed, &template, current, options())
        .generate()
        .unwrap();
    read_archive_bytes(&write_archive_bytes(&generated).unwrap(), ADVERTISER).unwrap()
}

#[test]
fn test_insertion_orders_follow_template_axes() {
    let cases = [
        ("{base_name}-{row_name}-{rule_name}", 6),
        ("{base_name}-{row_name}", 3),
        ("{base_name}", 1),
    ];
    for (io_template, expected) in cases {
        let sdf = generate(&config(io_template), None);
        assert_eq!(
            sdf.count(EntityKind::InsertionOrder),
            expected,
            "{}",
            io_template
        );
        assert_eq!(sdf.count(EntityKind::LineItem), 6, "{}", io_template);
    }
}

#[test]
fn test_provenance_survives_export() {
    let sdf = generate(&config("{base_name}-{row_name}-{rule_name}"), None);
    let ios = sdf.table(EntityKind::InsertionOrder).unwrap();
    let keys: Vec<_> = (0..ios.len())
        .map(|i| {
            let p = ios.provenance(i).unwrap();
            (p.source_id.clone(), p.row_key.clone(), p.rule_key.clone())
        })
        .collect();
    assert!(keys.contains(&("4001".to_string(), "SPB".to_string(), "Cold".to_string())));
    assert!(keys.contains(&("4001".to_string(), "Kazan".to_string(), "Warm".to_string())));

    let lis = sdf.table(EntityKind::LineItem).unwrap();
    for i in 0..lis.len() {
        assert_eq!(lis.text("Frequency Period", i), "Weeks");
        assert_eq!(lis.text("Frequency Exposures", i), "2");
        assert_eq!(lis.text("Bid Strategy Value", i), "3");
        assert_eq!(lis.status(i), "Paused");
    }
}

#[test]
fn test_regeneration_reuses_everything() {
    let config = config("{base_name}-{row_name}-{rule_name}");
    let first = generate(&config, None);

    let feed = feed();
    let template = display_template();
    let mut ctx = GenerationContext::new();
    let second = CampaignStructureGenerator::new(&config, &feed, &template, Some(&first), options())
        .generate_in(&mut ctx)
        .unwrap();
    for kind in [EntityKind::InsertionOrder, EntityKind::LineItem] {
        assert_eq!(ctx.reused(kind), first.count(kind));
        assert_eq!(ctx.created(kind), 0);
        assert_eq!(ctx.retired(kind), 0);
        let before = first.table(kind).unwrap();
        let after = second.table(kind).unwrap();
        let mut ids_before: Vec<_> = (0..before.len()).map(|i| before.id(i)).collect();
        let mut ids_after: Vec<_> = (0..after.len()).map(|i| after.id(i)).collect();
        ids_before.sort();
        ids_after.sort();
        assert_eq!(ids_before, ids_after);
    }
}

#[test]
fn test_invalid_frequency_fails_generation() {
    let mut config = config("{base_name}-{row_name}");
    config.rules[1].display_state = Some(display_state("abc"));
    let feed = feed();
    let template = display_template();
    let err = CampaignStructureGenerator::new(&config, &feed, &template, None, options())
        .generate()
        .unwrap_err();
    assert!(matches!(err, ApiError::FormatError(ref msg) if msg.contains("abc")));
}
