//! Rule selection
//!
//! `ConditionEvaluator` compiles rule conditions once per run and picks the effective rule for a
//! feed row: the first rule, in configuration order, whose condition is truthy.

use super::eval::{infer_kind, Evaluation};
use super::parser::{parse, Expr};
use super::value::Value;
use crate::config::RuleInfo;
use crate::error::ApiError;
use crate::rowset::Row;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct ConditionEvaluator {
    cache: HashMap<String, Expr>,
    now: Option<DateTime<Utc>>,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the instant `now()` and `today()` observe.
    pub fn with_now(now: DateTime<Utc>) -> Self {
        Self {
            cache: HashMap::new(),
            now: Some(now),
        }
    }

    /// Parse and kind-check a condition without evaluating it.
    pub fn validate(&self, condition: &str) -> Result<(), ApiError> {
        let expr = parse(condition).map_err(|source| ApiError::ExpressionParse {
            condition: condition.to_string(),
            source,
        })?;
        infer_kind(&expr).map_err(|source| ApiError::ExpressionParse {
            condition: condition.to_string(),
            source,
        })?;
        Ok(())
    }

    fn compile(&mut self, condition: &str) -> Result<&Expr, ApiError> {
        if !self.cache.contains_key(condition) {
            let expr = parse(condition).map_err(|source| ApiError::ExpressionParse {
                condition: condition.to_string(),
                source,
            })?;
            self.cache.insert(condition.to_string(), expr);
        }
        self.cache
            .get(condition)
            .ok_or_else(|| ApiError::DataError(format!("condition '{}' not compiled", condition)))
    }

    /// Evaluate a single rule's condition against a row.
    pub fn evaluate(&mut self, rule: &RuleInfo, row: &Row) -> Result<Value, ApiError> {
        let now = self.now.unwrap_or_else(Utc::now);
        let expr = self.compile(&rule.condition)?;
        Evaluation::new(row, now)
            .eval(expr)
            .map_err(|source| ApiError::ExpressionEval {
                rule: rule.name.clone(),
                source,
            })
    }

    /// First rule whose condition holds for the row; rules with an empty condition never match.
    pub fn get_active_rule<'r>(
        &mut self,
        rules: &'r [RuleInfo],
        row: &Row,
    ) -> Result<Option<&'r RuleInfo>, ApiError> {
        for rule in rules {
            if rule.condition.trim().is_empty() {
                trace!(rule = %rule.name, "Rule has no condition");
                continue;
            }
            let value = self.evaluate(rule, row)?;
            if value.is_truthy() {
                debug!(rule = %rule.name, "Rule matched");
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rowset::row_from;
    use proptest::prelude::*;
    use serde_json::json;

    fn warm_cold() -> Vec<RuleInfo> {
        vec![
            RuleInfo::new("Warm", "temp >= 0"),
            RuleInfo::new("Cold", "temp < 0"),
        ]
    }

    #[test]
    fn test_first_match_selection() {
        let rules = warm_cold();
        let mut evaluator = ConditionEvaluator::new();

        let warm = row_from([("temp", json!(3))]);
        let cold = row_from([("temp", json!(-3))]);
        assert_eq!(
            evaluator.get_active_rule(&rules, &warm).unwrap().unwrap().name,
            "Warm"
        );
        assert_eq!(
            evaluator.get_active_rule(&rules, &cold).unwrap().unwrap().name,
            "Cold"
        );
        assert_eq!(evaluator.cache.len(), 2);
    }

    #[test]
    fn test_overlapping_rules_prefer_first() {
        let rules = vec![
            RuleInfo::new("Any", "true"),
            RuleInfo::new("Warm", "temp >= 0"),
        ];
        let row = row_from([("temp", json!(10))]);
        let mut evaluator = ConditionEvaluator::new();
        assert_eq!(
            evaluator.get_active_rule(&rules, &row).unwrap().unwrap().name,
            "Any"
        );
    }

    #[test]
    fn test_no_rule_matches() {
        let rules = vec![RuleInfo::new("Hot", "temp > 30"), RuleInfo::new("Empty", "")];
        let row = row_from([("temp", json!(10))]);
        let mut evaluator = ConditionEvaluator::new();
        assert!(evaluator.get_active_rule(&rules, &row).unwrap().is_none());
    }

    #[test]
    fn test_errors_carry_context() {
        let evaluator = ConditionEvaluator::new();
        let err = evaluator.validate("temp >").unwrap_err();
        assert!(err.to_string().contains("\"temp >\""));

        let mut evaluator = ConditionEvaluator::new();
        let rules = vec![RuleInfo::new("Humid", "humidity > 50")];
        let row = row_from([("temp", json!(10))]);
        let err = evaluator.get_active_rule(&rules, &row).unwrap_err();
        assert!(matches!(err, ApiError::ExpressionEval { ref rule, .. } if rule == "Humid"));
    }

    #[test]
    fn test_pinned_now() {
        let now = DateTime::parse_from_rfc3339("2021-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut evaluator = ConditionEvaluator::with_now(now);
        let rules = vec![RuleInfo::new("Started", "date(start) <= today()")];
        let row = row_from([("start", json!("2021-06-15"))]);
        assert!(evaluator.get_active_rule(&rules, &row).unwrap().is_some());
    }

    proptest! {
        #[test]
        fn prop_warm_cold_partition(temp in -1000i64..1000) {
            let rules = warm_cold();
            let row = row_from([("temp", json!(temp))]);
            let mut evaluator = ConditionEvaluator::new();
            let rule = evaluator.get_active_rule(&rules, &row).unwrap().unwrap();
            prop_assert_eq!(rule.name.as_str(), if temp >= 0 { "Warm" } else { "Cold" });
        }

        #[test]
        fn prop_comparison_matches_numeric_order(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let rules = vec![RuleInfo::new("Less", "a < b")];
            let row = row_from([("a", json!(a)), ("b", json!(b))]);
            let mut evaluator = ConditionEvaluator::new();
            let matched = evaluator.get_active_rule(&rules, &row).unwrap().is_some();
            prop_assert_eq!(matched, a < b);
        }
    }
}
