//! First-match rule selection over joined feed rows

use super::test_utils::{warm_cold_rules, write_workspace};
use serde_json::json;
use tempfile::TempDir;
use triggerator::config::{ConfigLoader, RuleInfo};
use triggerator::feed::{load_all, SourceFeedLoader};
use triggerator::rowset::{row_from, Row};
use triggerator::rules::ConditionEvaluator;

#[tokio::test]
async fn test_warm_and_cold_rows() {
    let temp = TempDir::new().unwrap();
    write_workspace(temp.path(), "{base_name}-{row_name}");
    let config = ConfigLoader::load(temp.path()).unwrap();
    let loader = SourceFeedLoader::new(temp.path()).unwrap();
    let feed = load_all(&config.feeds, &loader).await.unwrap();

    let mut evaluator = ConditionEvaluator::new();
    let effective: Vec<_> = feed
        .iter()
        .map(|row| {
            evaluator
                .get_active_rule(&config.rules, row)
                .unwrap()
                .map(|rule| rule.name.clone())
        })
        .collect();
    assert_eq!(
        effective,
        vec![Some("Warm".to_string()), Some("Cold".to_string())]
    );
}

#[test]
fn test_boundary_and_priority() {
    let mut rules = warm_cold_rules();
    rules.insert(0, RuleInfo::new("Freezing", "temp < -20 && sky == 'snow'"));
    let mut evaluator = ConditionEvaluator::new();

    let zero = row_from([("temp", json!(0)), ("sky", json!("clear"))]);
    let freezing = row_from([("temp", json!(-25)), ("sky", json!("snow"))]);
    let cold_clear = row_from([("temp", json!(-25)), ("sky", json!("clear"))]);

    let name = |evaluator: &mut ConditionEvaluator, row: &Row| {
        evaluator
            .get_active_rule(&rules, row)
            .unwrap()
            .map(|rule| rule.name.clone())
    };
    assert_eq!(name(&mut evaluator, &zero).as_deref(), Some("Warm"));
    assert_eq!(name(&mut evaluator, &freezing).as_deref(), Some("Freezing"));
    assert_eq!(name(&mut evaluator, &cold_clear).as_deref(), Some("Cold"));
}

#[test]
fn test_no_rule_matches() {
    let rules = vec![RuleInfo::new("Hot", "temp > 30"), RuleInfo::new("Idle", "")];
    let mut evaluator = ConditionEvaluator::new();
    let row = row_from([("temp", json!(12))]);
    assert!(evaluator.get_active_rule(&rules, &row).unwrap().is_none());
}
