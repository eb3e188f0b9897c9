//! Configuration validation: every problem is collected and reported together, except for the
//! few structural gaps that make further checks meaningless (those fail fast).

use super::{FeedConfig, RuleInfo, TemplateConfig, TriggeratorConfig};
use crate::error::ApiError;
use crate::rowset::{field, RowSet};
use crate::rules::ConditionEvaluator;
use crate::sdf::template::{ROW_NAME_MACRO, RULE_NAME_MACRO};

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Feed(String),
    Rule(String, String),
    Template(String),
    Execution(String),
    Runtime(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Feed(msg) => write!(f, "Feeds: {}", msg),
            ValidationError::Rule(name, msg) => write!(f, "Rule '{}': {}", name, msg),
            ValidationError::Template(msg) => write!(f, "Template: {}", msg),
            ValidationError::Execution(msg) => write!(f, "Execution: {}", msg),
            ValidationError::Runtime(msg) => write!(f, "Feed data: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

pub struct ConfigValidator;

impl ConfigValidator {
    /// Checks shared by generation and activation.
    fn validate_base(config: &TriggeratorConfig) -> Vec<ValidationError> {
        let mut errors = Self::validate_feeds(&config.feeds);
        if config
            .execution
            .advertiser_id
            .as_deref()
            .map_or(true, str::is_empty)
        {
            errors.push(ValidationError::Execution(
                "Advertiser id is not specified".to_string(),
            ));
        }
        errors.extend(Self::validate_rules(&config.rules));
        errors
    }

    pub fn validate_feeds(feeds: &FeedConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if feeds.feeds.is_empty() {
            errors.push(ValidationError::Feed("Feeds are not specified".to_string()));
            return errors;
        }
        if feeds.name_column.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::Feed(
                "Feed name column is not specified".to_string(),
            ));
        }

        for feed in &feeds.feeds {
            if feed.name.is_empty() {
                errors.push(ValidationError::Feed(
                    "A feed's name is not specified".to_string(),
                ));
            }
            if feed.url.is_empty() {
                errors.push(ValidationError::Feed(format!(
                    "The '{}' feed's url is not specified",
                    feed.name
                )));
            }
            if let Some((ext_feed, _)) = feed.external_ref() {
                if ext_feed == feed.name {
                    errors.push(ValidationError::Feed(format!(
                        "The '{}' feed refers to itself by its external key",
                        feed.name
                    )));
                } else if feeds.find(ext_feed).is_none() {
                    errors.push(ValidationError::Feed(format!(
                        "The '{}' feed refers to unknown feed by external key {}",
                        feed.name, ext_feed
                    )));
                }
                if feed.key_column.as_deref().map_or(true, str::is_empty) {
                    errors.push(ValidationError::Feed(format!(
                        "The '{}' feed has an external key but has no key column",
                        feed.name
                    )));
                }
            }
        }

        let roots = feeds.feeds.iter().filter(|f| f.is_root()).count();
        if feeds.feeds.len() > 1 && roots > 1 {
            errors.push(ValidationError::Feed(
                "Found several feeds without external key".to_string(),
            ));
        }
        if feeds.feeds.len() > 1 && roots == 0 {
            errors.push(ValidationError::Feed(
                "Among several feeds there should be one and only one without external key"
                    .to_string(),
            ));
        }
        errors
    }

    pub fn validate_rules(rules: &[RuleInfo]) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if rules.is_empty() {
            errors.push(ValidationError::Rule(
                String::new(),
                "There are no rules in configuration".to_string(),
            ));
        }
        let evaluator = ConditionEvaluator::new();
        for rule in rules {
            if rule.name.is_empty() {
                errors.push(ValidationError::Rule(
                    String::new(),
                    "A rule's name is not specified".to_string(),
                ));
            }
            if rule.condition.trim().is_empty() {
                errors.push(ValidationError::Rule(
                    rule.name.clone(),
                    "condition is not specified".to_string(),
                ));
            } else if let Err(e) = evaluator.validate(&rule.condition) {
                errors.push(ValidationError::Rule(rule.name.clone(), e.to_string()));
            }
            if rule.display_state.is_none() && rule.youtube_state.is_none() {
                errors.push(ValidationError::Rule(
                    rule.name.clone(),
                    "neither display nor youtube state is specified".to_string(),
                ));
            }
        }
        errors
    }

    pub fn validate_templates(template: &TemplateConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if let (Some(io), Some(li)) = (&template.io_template, &template.li_template) {
            let io_row = io.contains(ROW_NAME_MACRO);
            let io_rule = io.contains(RULE_NAME_MACRO);
            let li_row = li.contains(ROW_NAME_MACRO);
            let li_rule = li.contains(RULE_NAME_MACRO);
            if io_rule && !io_row {
                errors.push(ValidationError::Template(
                    "Template for IO contains rule_name macro without row_name".to_string(),
                ));
            }
            if io_row && !io_rule && !li_rule {
                errors.push(ValidationError::Template(
                    "If IO template doesn't depend on rule (no rule_name macro) then LI template \
                     must depend on rule but it doesn't"
                        .to_string(),
                ));
            }
            if !io_row && !io_rule && !(li_row && li_rule) {
                errors.push(ValidationError::Template(
                    "If IO template depends on nothing (no rule_name/row_name macros) then LI \
                     template must depend on row and rule but it doesn't"
                        .to_string(),
                ));
            }
        }
        if let Some(yt_io) = &template.yt_io_template {
            if !yt_io.contains(ROW_NAME_MACRO) || !yt_io.contains(RULE_NAME_MACRO) {
                errors.push(ValidationError::Template(
                    "TrueView IO template must always depend on row and rule \
                     (rule_name/row_name macros) but it doesn't"
                        .to_string(),
                ));
            }
        }
        errors
    }

    /// Validate configuration for generating a new (`update == false`) or updated campaign.
    pub fn validate_generation(
        config: &TriggeratorConfig,
        update: bool,
    ) -> Result<Vec<ValidationError>, ApiError> {
        if config
            .template
            .template_campaign
            .as_deref()
            .map_or(true, str::is_empty)
        {
            return Err(ApiError::ConfigurationError(
                "Template campaign id is missing in configuration".to_string(),
            ));
        }
        if update && config.execution.campaign_id.as_deref().map_or(true, str::is_empty) {
            return Err(ApiError::ConfigurationError(
                "Existing campaign id is missing in configuration".to_string(),
            ));
        }
        if !update
            && config
                .template
                .campaign_name
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(ApiError::ConfigurationError(
                "New campaign name is not specified in configuration".to_string(),
            ));
        }
        let mut errors = Self::validate_base(config);
        errors.extend(Self::validate_templates(&config.template));
        Ok(errors)
    }

    /// Validate configuration for an activation run.
    pub fn validate_runtime(config: &TriggeratorConfig) -> Vec<ValidationError> {
        let mut errors = Self::validate_base(config);
        if config.execution.campaign_id.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::Execution(
                "Campaign id is not specified".to_string(),
            ));
        }
        errors
    }

    /// Check the configured columns exist in the first row of the joined feed.
    pub fn validate_feed_columns(config: &TriggeratorConfig, feed: &RowSet) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let row = match feed.rows().first() {
            Some(row) => row,
            None => {
                errors.push(ValidationError::Runtime("Feed contains no rows".to_string()));
                return errors;
            }
        };
        let checks = [
            ("Row name", config.feeds.name_column.as_deref()),
            ("Geo code", config.feeds.geo_code_column.as_deref()),
            ("Budget factor", config.feeds.budget_factor_column.as_deref()),
        ];
        for (label, column) in checks {
            if let Some(column) = column.filter(|c| !c.is_empty()) {
                if field(row, column).is_none() {
                    errors.push(ValidationError::Runtime(format!(
                        "{} column '{}' was not found in feed data",
                        label, column
                    )));
                }
            }
        }
        errors
    }

    /// Turn collected errors into a single `ValidationFailed`.
    pub fn ensure(errors: Vec<ValidationError>) -> Result<(), ApiError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationFailed(
                errors.iter().map(|e| e.to_string()).collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeedInfo, RuleState};
    use serde_json::json;

    fn feed(name: &str, ext: Option<&str>) -> FeedInfo {
        FeedInfo {
            name: name.to_string(),
            url: format!("{}.json", name),
            key_column: Some("id".to_string()),
            external_key: ext.map(str::to_string),
            ..Default::default()
        }
    }

    fn valid_config() -> TriggeratorConfig {
        let mut config = TriggeratorConfig::default();
        config.execution.advertiser_id = Some("1".to_string());
        config.execution.campaign_id = Some("2".to_string());
        config.feeds.name_column = Some("name".to_string());
        config.feeds.feeds = vec![feed("main", None)];
        let mut rule = RuleInfo::new("Warm", "temp >= 0");
        rule.display_state = Some(RuleState::default());
        config.rules = vec![rule];
        config.template.template_campaign = Some("10".to_string());
        config.template.campaign_name = Some("New".to_string());
        config
    }

    #[test]
    fn test_valid_config_passes() {
        let config = valid_config();
        assert!(ConfigValidator::validate_runtime(&config).is_empty());
        assert!(ConfigValidator::validate_generation(&config, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_feed_errors_are_collected() {
        let feeds = FeedConfig {
            name_column: None,
            feeds: vec![
                feed("a", None),
                feed("b", None),
                feed("c", Some("c.id")),
                feed("d", Some("zzz.id")),
            ],
            ..Default::default()
        };
        let errors = ConfigValidator::validate_feeds(&feeds);
        let text: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(text.iter().any(|e| e.contains("name column")));
        assert!(text.iter().any(|e| e.contains("refers to itself")));
        assert!(text.iter().any(|e| e.contains("unknown feed")));
        assert!(text.iter().any(|e| e.contains("several feeds")));
    }

    #[test]
    fn test_no_root_among_several() {
        let feeds = FeedConfig {
            name_column: Some("name".to_string()),
            feeds: vec![feed("a", Some("b.id")), feed("b", Some("a.id"))],
            ..Default::default()
        };
        let errors = ConfigValidator::validate_feeds(&feeds);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("one and only one")));
    }

    #[test]
    fn test_rule_condition_is_parsed() {
        let mut config = valid_config();
        config.rules[0].condition = "temp >= (".to_string();
        let errors = ConfigValidator::validate_runtime(&config);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], ValidationError::Rule(name, _) if name == "Warm"));
    }

    #[test]
    fn test_template_axis_combinations() {
        let template = TemplateConfig {
            io_template: Some("{base_name}-{rule_name}".to_string()),
            li_template: Some("{base_name}".to_string()),
            yt_io_template: Some("{base_name}-{row_name}".to_string()),
            ..Default::default()
        };
        let errors = ConfigValidator::validate_templates(&template);
        assert_eq!(errors.len(), 2);

        let static_io = TemplateConfig {
            io_template: Some("{base_name}".to_string()),
            li_template: Some("{base_name}-{row_name}".to_string()),
            ..Default::default()
        };
        assert_eq!(ConfigValidator::validate_templates(&static_io).len(), 1);
    }

    #[test]
    fn test_generation_fatal_errors() {
        let mut config = valid_config();
        config.execution.campaign_id = None;
        assert!(ConfigValidator::validate_generation(&config, true).is_err());
        config.template.template_campaign = None;
        assert!(ConfigValidator::validate_generation(&config, false).is_err());
    }

    #[test]
    fn test_feed_columns_checked_against_first_row() {
        let mut config = valid_config();
        config.feeds.geo_code_column = Some("geo.code".to_string());
        config.feeds.budget_factor_column = Some("factor".to_string());
        let feed = RowSet::from_json_values(vec![json!({"name": "Moscow", "geo": {"code": 1}})])
            .unwrap();
        let errors = ConfigValidator::validate_feed_columns(&config, &feed);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("Budget factor"));
    }

    #[test]
    fn test_ensure_reports_all() {
        let err = ConfigValidator::ensure(vec![
            ValidationError::Feed("one".into()),
            ValidationError::Template("two".into()),
        ])
        .unwrap_err();
        match err {
            ApiError::ValidationFailed(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
