//! Shared fixtures: a display template campaign, the weather feeds and a workspace on disk.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use triggerator::config::{RuleInfo, RuleState};
use triggerator::platform::archive_file_name;
use triggerator::rowset::{row_from, Row, RowSet};
use triggerator::sdf::{write_archive, EntityKind, SdfStructure, SdfTable};

pub const ADVERTISER: &str = "506732";
pub const TEMPLATE_CAMPAIGN: &str = "900";
pub const GENERATED_CAMPAIGN: &str = "ext900";

pub const MAIN_FEED: &str = r#"[
  {"id": 1, "name": "Moscow", "city_id": 10},
  {"id": 2, "name": "SPB", "city_id": 20}
]"#;

pub const WEATHER_FEED: &str = "city_id,temp,sky\n10,25,clear\n20,-5,snow\n";

fn table(kind: EntityKind, rows: Vec<Row>) -> SdfTable {
    SdfTable::from_rowset(kind, RowSet::from_rows(rows).unwrap())
}

/// Template campaign with one insertion order and one display line item.
pub fn display_template() -> SdfStructure {
    let mut sdf = SdfStructure::new(ADVERTISER);
    sdf.insert(table(
        EntityKind::Campaign,
        vec![row_from([
            ("Campaign Id", TEMPLATE_CAMPAIGN),
            ("Name", "Template"),
            ("Timestamp", ""),
            ("Status", "Paused"),
            ("Campaign Start Date", ""),
            ("Campaign End Date", ""),
        ])],
    ));
    sdf.insert(table(
        EntityKind::InsertionOrder,
        vec![row_from([
            ("Io Id", "4001"),
            ("Campaign Id", TEMPLATE_CAMPAIGN),
            ("Name", "Camp"),
            ("Timestamp", ""),
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
            ("Timestamp", ""),
            ("Status", "Paused"),
            ("Details", ""),
            ("Bid Strategy Value", "2"),
        ])],
    ));
    sdf
}

pub fn display_state(frequency_li: &str) -> RuleState {
    RuleState {
        bid: Some("x1.5".to_string()),
        frequency_li: Some(frequency_li.to_string()),
        creatives: Some("101, 102".to_string()),
        ..Default::default()
    }
}

pub fn warm_cold_rules() -> Vec<RuleInfo> {
    let mut warm = RuleInfo::new("Warm", "temp >= 0");
    warm.display_state = Some(display_state("2/week"));
    let mut cold = RuleInfo::new("Cold", "temp < 0");
    cold.display_state = Some(display_state("2/week"));
    vec![warm, cold]
}

pub fn flight() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2031, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2031, 7, 31).unwrap(),
    )
}

/// Workspace with both feeds under `data/`, `config/config.toml` and an archive cache holding
/// the template campaign. Returns the cache directory.
pub fn write_workspace(root: &Path, io_template: &str) -> PathBuf {
    let data = root.join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("main.json"), MAIN_FEED).unwrap();
    std::fs::write(data.join("weather.csv"), WEATHER_FEED).unwrap();

    let config_dir = root.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), workspace_config(io_template)).unwrap();

    let cache = root.join("cache");
    std::fs::create_dir_all(&cache).unwrap();
    write_archive(
        &display_template(),
        &cache.join(archive_file_name(ADVERTISER, TEMPLATE_CAMPAIGN, 1000)),
    )
    .unwrap();
    cache
}

pub fn workspace_config(io_template: &str) -> String {
    format!(
        r#"
[execution]
advertiser_id = "{advertiser}"
campaign_id = "{campaign}"

[feeds]
name_column = "name"

[[feeds.sources]]
name = "main"
url = "data/main.json"
type = "JSON"
key_column = "id"

[[feeds.sources]]
name = "weather"
url = "data/weather.csv"
type = "CSV"
key_column = "city_id"
external_key = "main.city_id"

[[rules]]
name = "Warm"
condition = "temp >= 0"

[rules.display_state]
bid = "x1.5"
frequency_li = "2/week"
creatives = "101, 102"

[[rules]]
name = "Cold"
condition = "temp < 0"

[rules.display_state]
bid = "x1.5"
frequency_li = "2/week"
creatives = "101, 102"

[template]
template_campaign = "{template}"
campaign_name = "Weather"
io_template = "{io_template}"
li_template = "{{base_name}}-{{row_name}}-{{rule_name}}"
"#,
        advertiser = ADVERTISER,
        campaign = GENERATED_CAMPAIGN,
        template = TEMPLATE_CAMPAIGN,
        io_template = io_template,
    )
}
