//! Loading feeds from disk and joining them into one row set

use super::test_utils::write_workspace;
use serde_json::json;
use tempfile::TempDir;
use triggerator::config::{ConfigLoader, FeedInfo};
use triggerator::feed::{load_all, FeedJoinEngine, SourceFeedLoader};
use triggerator::rowset::RowSet;

#[tokio::test]
async fn test_join_from_workspace_files() {
    let temp = TempDir::new().unwrap();
    write_workspace(temp.path(), "{base_name}-{row_name}");
    let config = ConfigLoader::load(temp.path()).unwrap();
    let loader = SourceFeedLoader::new(temp.path()).unwrap();

    let feed = load_all(&config.feeds, &loader).await.unwrap();
    assert_eq!(feed.row_count(), 2);
    assert_eq!(feed.get("name", 0).unwrap(), &json!("Moscow"));
    assert_eq!(feed.get("temp", 0).unwrap(), &json!(25));
    assert_eq!(feed.get("sky", 1).unwrap(), &json!("snow"));
    // the right feed's colliding key is kept under its feed name
    assert_eq!(feed.get("weather.city_id", 1).unwrap(), &json!(20));
    assert_eq!(
        feed.get("$weather", 0).unwrap(),
        &json!([10, 25, "clear"])
    );
}

#[test]
fn test_unmatched_rows_are_dropped() {
    let main = FeedInfo {
        name: "main".to_string(),
        key_column: Some("id".to_string()),
        ..Default::default()
    };
    let weather = FeedInfo {
        name: "weather".to_string(),
        key_column: Some("city_id".to_string()),
        external_key: Some("main.city_id".to_string()),
        ..Default::default()
    };
    let main_rows = RowSet::from_json_values(vec![
        json!({"id": 1, "name": "Moscow", "city_id": 10}),
        json!({"id": 2, "name": "Kazan", "city_id": 30}),
    ])
    .unwrap();
    let weather_rows =
        RowSet::from_json_values(vec![json!({"city_id": 10, "temp": 25})]).unwrap();

    let joined = FeedJoinEngine::new(vec![(main, main_rows), (weather, weather_rows)])
        .join()
        .unwrap();
    assert_eq!(joined.row_count(), 1);
    assert_eq!(joined.get("name", 0).unwrap(), &json!("Moscow"));
}
