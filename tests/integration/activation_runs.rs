//! Activation against an archive-backed platform

use super::test_utils::{display_template, flight, warm_cold_rules, ADVERTISER, GENERATED_CAMPAIGN};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use triggerator::activation::{ActivationEngine, ActivationOptions, AuditOutcome};
use triggerator::platform::{archive_file_name, LocalPlatform, PlatformFacade};
use triggerator::rowset::RowSet;
use triggerator::sdf::template::NameTemplates;
use triggerator::sdf::{
    write_archive, CampaignStructureGenerator, EntityKind, GenerationOptions, GeneratorConfig,
};

fn feed(spb_temp: i64) -> RowSet {
    RowSet::from_json_values(vec![
        json!({"name": "Moscow", "temp": 25}),
        json!({"name": "SPB", "temp": spb_temp}),
        json!({"name": "Kazan", "temp": 3}),
    ])
    .unwrap()
}

/// Generate the campaign for `io_template` and cache it as the live campaign.
fn publish(dir: &Path, io_template: &str) {
    let config = GeneratorConfig {
        templates: NameTemplates {
            io: Some(io_template.to_string()),
            li: Some("{base_name}-{row_name}-{rule_name}".to_string()),
            ..Default::default()
        },
        name_column: "name".to_string(),
        rules: warm_cold_rules(),
        campaign_name: Some("Weather".to_string()),
        ..Default::default()
    };
    let (start, end) = flight();
    let options = GenerationOptions {
        start_date: Some(start),
        end_date: Some(end),
        now: Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap(),
        ..Default::default()
    };
    let feed = feed(-5);
    let template = display_template();
    let sdf = CampaignStructureGenerator::new(&config, &feed, &template, None, options)
        .generate()
        .unwrap();
    write_archive(
        &sdf,
        &dir.join(archive_file_name(ADVERTISER, GENERATED_CAMPAIGN, 1000)),
    )
    .unwrap();
}

async fn activate(
    platform: &LocalPlatform,
    options: ActivationOptions,
    feed: &RowSet,
) -> (usize, Vec<(EntityKind, String, AuditOutcome)>) {
    let structure = platform
        .download_structure(ADVERTISER, GENERATED_CAMPAIGN)
        .await
        .unwrap();
    let mut engine = ActivationEngine::new(platform, options);
    let mutated = engine
        .run(&warm_cold_rules(), "name", feed, &structure)
        .await
        .unwrap();
    let audit = engine
        .audit()
        .iter()
        .map(|e| (e.kind, e.to_string(), e.outcome))
        .collect();
    (mutated, audit)
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let temp = TempDir::new().unwrap();
    publish(temp.path(), "{base_name}-{row_name}-{rule_name}");
    let platform = LocalPlatform::new(temp.path());

    let (mutated, audit) = activate(&platform, ActivationOptions::default(), &feed(-5)).await;
    assert_eq!(mutated, 3);
    assert_eq!(audit.len(), 6);
    let applied: Vec<_> = audit
        .iter()
        .filter(|(_, _, outcome)| *outcome == AuditOutcome::Applied)
        .map(|(_, text, _)| text.as_str())
        .collect();
    assert_eq!(applied.len(), 3);
    assert!(applied.iter().all(|text| text.ends_with(":Status=Active")));

    let (mutated, audit) = activate(&platform, ActivationOptions::default(), &feed(-5)).await;
    assert_eq!(mutated, 0);
    assert_eq!(audit.len(), 6);
    assert!(audit
        .iter()
        .all(|(_, _, outcome)| *outcome == AuditOutcome::Skipped));
}

#[tokio::test]
async fn test_saved_statuses_carry_over_to_a_new_platform() {
    let temp = TempDir::new().unwrap();
    publish(temp.path(), "{base_name}-{row_name}-{rule_name}");

    let first = LocalPlatform::new(temp.path());
    activate(&first, ActivationOptions::default(), &feed(-5)).await;
    assert_eq!(first.save().unwrap().len(), 1);

    let second = LocalPlatform::new(temp.path());
    let (mutated, _) = activate(&second, ActivationOptions::default(), &feed(-5)).await;
    assert_eq!(mutated, 0);

    // SPB warms up: its Warm branch starts and its Cold branch stops
    let (mutated, audit) = activate(&second, ActivationOptions::default(), &feed(4)).await;
    assert_eq!(mutated, 2);
    let applied: Vec<_> = audit
        .iter()
        .filter(|(_, _, outcome)| *outcome == AuditOutcome::Applied)
        .map(|(_, text, _)| text.clone())
        .collect();
    assert!(applied.iter().any(|t| t.ends_with("Status=Paused")));
    assert!(applied.iter().any(|t| t.ends_with("Status=Active")));
}

#[tokio::test]
async fn test_dry_run_leaves_campaign_untouched() {
    let temp = TempDir::new().unwrap();
    publish(temp.path(), "{base_name}-{row_name}-{rule_name}");
    let platform = LocalPlatform::new(temp.path());
    let options = ActivationOptions {
        dry_run: true,
        ..Default::default()
    };

    let (mutated, audit) = activate(&platform, options, &feed(-5)).await;
    assert_eq!(mutated, 3);
    assert_eq!(
        audit
            .iter()
            .filter(|(_, _, outcome)| *outcome == AuditOutcome::DryRun)
            .count(),
        3
    );
    assert!(platform.save().unwrap().is_empty());
    let structure = platform.structure(ADVERTISER, GENERATED_CAMPAIGN).unwrap();
    let ios = structure.table(EntityKind::InsertionOrder).unwrap();
    assert!((0..ios.len()).all(|i| ios.status(i) == "Paused"));
}

#[tokio::test]
async fn test_per_row_insertion_orders_toggle_line_items() {
    let temp = TempDir::new().unwrap();
    publish(temp.path(), "{base_name}-{row_name}");
    let platform = LocalPlatform::new(temp.path());

    let (mutated, audit) = activate(&platform, ActivationOptions::default(), &feed(-5)).await;
    assert_eq!(mutated, 3);
    assert!(audit.iter().all(|(kind, _, _)| *kind == EntityKind::LineItem));
    assert_eq!(audit.len(), 6);

    let (mutated, _) = activate(&platform, ActivationOptions::default(), &feed(-5)).await;
    assert_eq!(mutated, 0);
}

#[tokio::test]
async fn test_force_update_resends_every_status() {
    let temp = TempDir::new().unwrap();
    publish(temp.path(), "{base_name}-{row_name}-{rule_name}");
    let platform = LocalPlatform::new(temp.path());
    activate(&platform, ActivationOptions::default(), &feed(-5)).await;

    let options = ActivationOptions {
        force_update: true,
        ..Default::default()
    };
    let (mutated, audit) = activate(&platform, options, &feed(-5)).await;
    assert_eq!(mutated, 6);
    assert!(audit
        .iter()
        .all(|(_, _, outcome)| *outcome == AuditOutcome::Applied));
}
