// Generation and rule selection over a few hundred feed rows
// Run with: cargo bench

use chrono::{NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use triggerator::config::{RuleInfo, RuleState};
use triggerator::rowset::{row_from, RowSet};
use triggerator::rules::ConditionEvaluator;
use triggerator::sdf::template::NameTemplates;
use triggerator::sdf::{
    CampaignStructureGenerator, EntityKind, GenerationOptions, GeneratorConfig, SdfStructure,
    SdfTable,
};

fn template() -> SdfStructure {
    let mut sdf = SdfStructure::new("1");
    let table = |kind, rows| SdfTable::from_rowset(kind, RowSet::from_rows(rows).unwrap());
    sdf.insert(table(
        EntityKind::Campaign,
        vec![row_from([
            ("Campaign Id", "900"),
            ("Name", "Template"),
            ("Status", "Paused"),
            ("Campaign Start Date", ""),
            ("Campaign End Date", ""),
        ])],
    ));
    sdf.insert(table(
        EntityKind::InsertionOrder,
        vec![row_from([
            ("Io Id", "4001"),
            ("Campaign Id", "900"),
            ("Name", "Camp"),
            ("Status", "Paused"),
            ("Details", ""),
            ("Budget Segments", "(100.0;01/01/2021;02/01/2021;);"),
        ])],
    ));
    sdf.insert(table(
        EntityKind::LineItem,
        vec![row_from([
            ("Line Item Id", "5001"),
            ("Io Id", "4001"),
            ("Type", "Display"),
            ("Name", "Banner"),
            ("Status", "Paused"),
            ("Details", ""),
            ("Bid Strategy Value", "2"),
        ])],
    ));
    sdf
}

fn rules() -> Vec<RuleInfo> {
    ["temp >= 20", "temp >= 0 && temp < 20", "temp < 0"]
        .iter()
        .enumerate()
        .map(|(i, condition)| {
            let mut rule = RuleInfo::new(format!("Rule{}", i), *condition);
            rule.display_state = Some(RuleState {
                bid: Some("x1.5".to_string()),
                frequency_li: Some("2/week".to_string()),
                creatives: Some("101;102".to_string()),
                ..Default::default()
            });
            rule
        })
        .collect()
}

fn feed(rows: usize) -> RowSet {
    RowSet::from_json_values(
        (0..rows)
            .map(|i| json!({"name": format!("City{}", i), "temp": (i as i64 % 60) - 20}))
            .collect(),
    )
    .unwrap()
}

fn bench_generate(c: &mut Criterion) {
    let config = GeneratorConfig {
        templates: NameTemplates {
            io: Some("{base_name}-{row_name}-{rule_name}".to_string()),
            li: Some("{base_name}-{row_name}-{rule_name}".to_string()),
            ..Default::default()
        },
        name_column: "name".to_string(),
        rules: rules(),
        campaign_name: Some("Weather".to_string()),
        ..Default::default()
    };
    let feed = feed(300);
    let template = template();
    let options = GenerationOptions {
        start_date: NaiveDate::from_ymd_opt(2031, 7, 1),
        end_date: NaiveDate::from_ymd_opt(2031, 7, 31),
        now: Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap(),
        ..Default::default()
    };

    c.bench_function("generate_300_rows_3_rules", |b| {
        b.iter(|| {
            let sdf =
                CampaignStructureGenerator::new(&config, &feed, &template, None, options.clone())
                    .generate()
                    .unwrap();
            black_box(sdf);
        });
    });
}

fn bench_rule_selection(c: &mut Criterion) {
    let rules = rules();
    let feed = feed(300);
    let mut evaluator = ConditionEvaluator::new();

    c.bench_function("select_rules_300_rows", |b| {
        b.iter(|| {
            for row in feed.iter() {
                black_box(evaluator.get_active_rule(&rules, row).unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_generate, bench_rule_selection);
criterion_main!(benches);
