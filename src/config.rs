//! Configuration System
//!
//! Fully-resolved configuration for generation and activation runs: execution target, feed
//! declarations, rules, naming templates, custom-field overlays and platform access. Loaded
//! hierarchically through the `config` crate (defaults, global file, workspace files, environment)
//! and validated before any feed or platform work starts.

use crate::logging::LoggingConfig;
use crate::sdf::EntityKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;
pub mod validation;

pub use facade::ConfigLoader;
pub use validation::{ConfigValidator, ValidationError};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggeratorConfig {
    /// Advertiser and campaign being operated on
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Feed sources and the columns the pipeline reads from the joined feed
    #[serde(default)]
    pub feeds: FeedConfig,

    /// Rules in priority order; the first matching one is effective for a row
    #[serde(default)]
    pub rules: Vec<RuleInfo>,

    /// Template campaign and naming templates
    #[serde(default)]
    pub template: TemplateConfig,

    /// Field overlays applied to generated entities
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,

    /// Platform API access
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub advertiser_id: Option<String>,
    /// Existing campaign (required for activation and update-mode generation)
    pub campaign_id: Option<String>,
}

/// Feed source format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeedType {
    #[default]
    Auto,
    #[serde(rename = "JSON", alias = "json")]
    Json,
    #[serde(rename = "JSONL", alias = "jsonl")]
    JsonLines,
    #[serde(rename = "CSV", alias = "csv")]
    Csv,
}

/// A single feed source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedInfo {
    pub name: String,
    /// Local path, `file://` or `http(s)://` URL
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub feed_type: FeedType,
    /// This feed's join key
    pub key_column: Option<String>,
    /// `otherFeed.column` this feed joins against
    pub external_key: Option<String>,
    pub charset: Option<String>,
}

impl FeedInfo {
    /// Split `external_key` into (feed name, column).
    pub fn external_ref(&self) -> Option<(&str, &str)> {
        let key = self.external_key.as_deref().filter(|k| !k.is_empty())?;
        match key.find('.') {
            Some(pos) => Some((&key[..pos], &key[pos + 1..])),
            None => Some((key, "")),
        }
    }

    pub fn is_root(&self) -> bool {
        self.external_ref().is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Column holding the row label (`{row_name}`)
    pub name_column: Option<String>,
    pub geo_code_column: Option<String>,
    pub budget_factor_column: Option<String>,
    #[serde(default, rename = "sources")]
    pub feeds: Vec<FeedInfo>,
}

impl FeedConfig {
    pub fn name_column(&self) -> &str {
        self.name_column.as_deref().unwrap_or_default()
    }

    pub fn find(&self, name: &str) -> Option<&FeedInfo> {
        self.feeds.iter().find(|f| f.name == name)
    }
}

/// Per-medium state a rule applies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleState {
    /// Creative ids separated by `,` or `;`
    pub creatives: Option<String>,
    /// Literal bid or `x<multiplier>` of the template's bid
    #[serde(default, deserialize_with = "string_or_number")]
    pub bid: Option<String>,
    /// `N/day|week|month` cap at the grouping level
    pub frequency_io: Option<String>,
    /// `N/day|week|month` cap at the item level
    pub frequency_li: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub name: String,
    #[serde(default)]
    pub condition: String,
    pub display_state: Option<RuleState>,
    pub youtube_state: Option<RuleState>,
}

impl RuleInfo {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
            display_state: None,
            youtube_state: None,
        }
    }

    pub fn state(&self, media: Media) -> Option<&RuleState> {
        match media {
            Media::Display => self.display_state.as_ref(),
            Media::YouTube => self.youtube_state.as_ref(),
        }
    }
}

/// Template campaign and naming templates per entity level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub template_campaign: Option<String>,
    /// Name for a newly generated campaign
    pub campaign_name: Option<String>,
    pub total_budget: Option<f64>,
    pub io_template: Option<String>,
    pub li_template: Option<String>,
    pub yt_io_template: Option<String>,
    pub yt_li_template: Option<String>,
    pub adgroup_template: Option<String>,
    pub ad_template: Option<String>,
    /// Default directory for generated archives
    pub destination_folder: Option<PathBuf>,
}

/// Medium a custom field or rule state targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Media {
    Display,
    YouTube,
}

/// Field overlay applied to generated rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    /// Rule name or `All`
    #[serde(alias = "element_state")]
    pub rule_name: String,
    /// `Display`, `YouTube` or empty for both
    #[serde(default)]
    pub media: String,
    pub sdf_type: EntityKind,
    pub sdf_field: String,
    /// Literal value, or a `feed.column` reference into the current feed row
    #[serde(alias = "feed_column", default)]
    pub value: String,
}

impl CustomField {
    pub fn applies(&self, kind: EntityKind, rule_name: &str, media: Media) -> bool {
        let media_name = match media {
            Media::Display => "Display",
            Media::YouTube => "YouTube",
        };
        (self.rule_name == "All" || self.rule_name == rule_name)
            && self.sdf_type == kind
            && (self.media.is_empty() || self.media == media_name)
    }
}

/// Platform access and export polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token; falls back to `TRIGGERATOR_ACCESS_TOKEN`
    pub access_token: Option<String>,
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Directory downloaded archives are written to and read back from
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub keep_downloads: bool,
}

fn default_base_url() -> String {
    "https://displayvideo.googleapis.com".to_string()
}

fn default_polling_interval_ms() -> u64 {
    1_000
}

fn default_max_wait_ms() -> u64 {
    600_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            polling_interval_ms: default_polling_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_dir: None,
            keep_downloads: false,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(f)) => Some(crate::rowset::format_number(f)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TriggeratorConfig::default();
        assert!(config.rules.is_empty());
        assert!(config.feeds.feeds.is_empty());
        assert_eq!(config.platform.polling_interval_ms, 1_000);
        assert_eq!(config.platform.max_wait_ms, 600_000);
    }

    #[test]
    fn test_external_ref_split() {
        let feed = FeedInfo {
            name: "city".to_string(),
            external_key: Some("main.city_id".to_string()),
            ..Default::default()
        };
        assert_eq!(feed.external_ref(), Some(("main", "city_id")));
        assert!(!feed.is_root());

        let root = FeedInfo {
            name: "main".to_string(),
            external_key: Some(String::new()),
            ..Default::default()
        };
        assert!(root.is_root());
    }

    #[test]
    fn test_rule_bid_accepts_numbers() {
        let rule: RuleInfo = toml::from_str(
            r#"
name = "Warm"
condition = "temp >= 0"

[display_state]
bid = 2.5
frequency_io = "2/week"
"#,
        )
        .unwrap();
        let state = rule.state(Media::Display).unwrap();
        assert_eq!(state.bid.as_deref(), Some("2.5"));
        assert_eq!(state.frequency_io.as_deref(), Some("2/week"));
        assert!(rule.state(Media::YouTube).is_none());
    }

    #[test]
    fn test_custom_field_applicability() {
        let field = CustomField {
            rule_name: "All".to_string(),
            media: "YouTube".to_string(),
            sdf_type: EntityKind::LineItem,
            sdf_field: "Integration Code".to_string(),
            value: "main.code".to_string(),
        };
        assert!(field.applies(EntityKind::LineItem, "Warm", Media::YouTube));
        assert!(!field.applies(EntityKind::LineItem, "Warm", Media::Display));
        assert!(!field.applies(EntityKind::InsertionOrder, "Warm", Media::YouTube));
    }
}
