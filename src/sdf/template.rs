//! Naming templates and field formats
//!
//! Entity names are produced from per-level templates with three macros, each substituted once.
//! The same module holds the small text formats generated rows are written in: frequency caps,
//! bids, creative lists, geo codes, dates and budget segments.

use crate::config::TemplateConfig;
use crate::error::ApiError;
use crate::rowset::{format_number, try_parse_number, value_text};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const BASE_NAME_MACRO: &str = "{base_name}";
pub const ROW_NAME_MACRO: &str = "{row_name}";
pub const RULE_NAME_MACRO: &str = "{rule_name}";

/// Which expansion axes a name template depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateAxes {
    pub row: bool,
    pub rule: bool,
}

impl TemplateAxes {
    pub const NONE: TemplateAxes = TemplateAxes {
        row: false,
        rule: false,
    };
    pub const ROW_AND_RULE: TemplateAxes = TemplateAxes {
        row: true,
        rule: true,
    };

    pub fn of(template: Option<&str>) -> Self {
        match template {
            Some(t) => TemplateAxes {
                row: t.contains(ROW_NAME_MACRO),
                rule: t.contains(RULE_NAME_MACRO),
            },
            None => TemplateAxes::NONE,
        }
    }
}

/// Name templates for every generated level.
#[derive(Debug, Clone, Default)]
pub struct NameTemplates {
    pub io: Option<String>,
    pub li: Option<String>,
    pub yt_io: Option<String>,
    pub yt_li: Option<String>,
    pub ad_group: Option<String>,
    pub ad: Option<String>,
}

impl NameTemplates {
    pub fn from_config(template: &TemplateConfig) -> Self {
        Self {
            io: template.io_template.clone(),
            li: template.li_template.clone(),
            yt_io: template.yt_io_template.clone(),
            yt_li: template.yt_li_template.clone(),
            ad_group: template.adgroup_template.clone(),
            ad: template.ad_template.clone(),
        }
    }

    /// Axes of display insertion orders.
    pub fn io_axes(&self) -> TemplateAxes {
        TemplateAxes::of(self.io.as_deref())
    }

    pub fn io_name(&self, trueview: bool, base: &str, row: &str, rule: &str) -> String {
        let template = if trueview { &self.yt_io } else { &self.io };
        render(template.as_deref(), base, row, rule)
    }

    pub fn li_name(&self, trueview: bool, base: &str, row: &str, rule: &str) -> String {
        let template = if trueview { &self.yt_li } else { &self.li };
        render(template.as_deref(), base, row, rule)
    }

    pub fn ad_group_name(&self, base: &str, row: &str, rule: &str) -> String {
        render(self.ad_group.as_deref(), base, row, rule)
    }

    pub fn ad_name(&self, base: &str, row: &str, rule: &str) -> String {
        render(self.ad.as_deref(), base, row, rule)
    }
}

/// Substitute each macro once and trim. A missing template keeps the base name.
pub fn render(template: Option<&str>, base: &str, row: &str, rule: &str) -> String {
    let Some(template) = template else {
        return base.to_string();
    };
    template
        .replacen(BASE_NAME_MACRO, base, 1)
        .replacen(ROW_NAME_MACRO, row, 1)
        .replacen(RULE_NAME_MACRO, rule, 1)
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyPeriod {
    Days,
    Weeks,
    Months,
}

impl FrequencyPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyPeriod::Days => "Days",
            FrequencyPeriod::Weeks => "Weeks",
            FrequencyPeriod::Months => "Months",
        }
    }
}

/// A frequency cap: `exposures` per `amount` `period`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub exposures: u32,
    pub period: FrequencyPeriod,
    pub amount: u32,
}

fn frequency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*/\s*(day|week|month)\s*$").expect("valid frequency regex")
    })
}

/// Parse `N/day`, `N/week` or `N/month`.
pub fn parse_frequency(text: &str) -> Result<Frequency, ApiError> {
    let caps = frequency_pattern()
        .captures(text)
        .ok_or_else(|| ApiError::FormatError(format!("Invalid frequency format: {}", text)))?;
    let exposures = caps[1]
        .parse::<u32>()
        .map_err(|e| ApiError::FormatError(format!("Invalid frequency '{}': {}", text, e)))?;
    let period = match &caps[2] {
        "day" => FrequencyPeriod::Days,
        "week" => FrequencyPeriod::Weeks,
        _ => FrequencyPeriod::Months,
    };
    Ok(Frequency {
        exposures,
        period,
        amount: 1,
    })
}

/// Resolve a rule bid: a literal number, or `x<factor>` applied to the template's value.
pub fn bid_value(bid: &str, template_value: &str) -> Result<String, ApiError> {
    let bid = bid.trim();
    if let Some(factor) = bid.strip_prefix('x') {
        let factor = try_parse_number(factor)
            .ok_or_else(|| ApiError::FormatError(format!("Invalid bid multiplier: {}", bid)))?;
        let base = try_parse_number(template_value).ok_or_else(|| {
            ApiError::FormatError(format!(
                "Couldn't parse template bid value as number: {}",
                template_value
            ))
        })?;
        return Ok(format_number(base * factor));
    }
    try_parse_number(bid)
        .map(format_number)
        .ok_or_else(|| ApiError::FormatError(format!("Invalid bid value: {}", bid)))
}

/// Creative ids as the line item assignment list: `;`-separated, no spaces, trailing `;`.
pub fn creative_assignments(creatives: &str) -> String {
    let mut list: String = creatives
        .replace(',', ";")
        .chars()
        .filter(|c| *c != ' ')
        .collect();
    if !list.ends_with(';') {
        list.push(';');
    }
    list
}

/// Split a creative list on `,` or `;`, dropping blanks.
pub fn split_creatives(creatives: &str) -> Vec<String> {
    creatives
        .split([',', ';'])
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Geo targeting value for a feed geo code: an integer, or `;`-separated integers in parens.
pub fn geo_targeting(code: &Value) -> Option<String> {
    let text = value_text(code);
    let text = text.trim();
    if is_integer(text) {
        return Some(text.to_string());
    }
    if text.contains(';') && text.split(';').all(|part| is_integer(part.trim())) {
        return Some(format!("({})", text));
    }
    None
}

fn is_integer(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// `MM/DD/YYYY`
pub fn format_date_only(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

/// `MM/DD/YYYY 00:00`
pub fn format_date(date: NaiveDate) -> String {
    format!("{} 00:00", format_date_only(date))
}

/// Parse a bulk-format date with or without the time part.
pub fn parse_sdf_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let date_part = text.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%m/%d/%Y").ok()
}

fn budget_amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\([0-9.]+;").expect("valid budget regex"))
}

/// Whether a `Budget Segments` value has at least one segment amount.
pub fn has_budget_segment(segments: &str) -> bool {
    budget_amount_pattern().is_match(segments)
}

/// Replace the first segment amount.
pub fn set_budget_amount(segments: &str, amount: f64) -> String {
    budget_amount_pattern()
        .replacen(segments, 1, format!("({};", format_number(amount)).as_str())
        .into_owned()
}

/// Collapse the segments into the first one, flighted between `start` and `end`.
pub fn reflight_budget(segments: &str, start: NaiveDate, end: NaiveDate) -> Option<String> {
    let first = budget_amount_pattern().find(segments)?;
    Some(format!(
        "{} {}; {};);",
        first.as_str(),
        format_date_only(start),
        format_date_only(end)
    ))
}
