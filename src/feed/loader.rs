//! Feed loading: fetches a feed source and parses it into a `RowSet`.

use crate::config::{FeedInfo, FeedType};
use crate::error::ApiError;
use crate::rowset::{coerce_numbers, Row, RowSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Loads one feed source.
#[async_trait]
pub trait FeedLoader: Send + Sync {
    async fn load(&self, feed: &FeedInfo) -> Result<RowSet, ApiError>;
}

const FEED_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FEED_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn build_feed_http_client() -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(FEED_HTTP_CONNECT_TIMEOUT)
        .timeout(FEED_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ApiError::DataError(format!("Failed to create HTTP client: {}", e)))
}

/// Loads feeds from local files, `file://` URLs and `http(s)://` URLs.
///
/// Relative paths resolve against `base_dir`. `.zip` sources are unpacked and their first file
/// entry is parsed.
pub struct SourceFeedLoader {
    client: Client,
    base_dir: PathBuf,
}

impl SourceFeedLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_feed_http_client()?,
            base_dir: base_dir.into(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::DataError(format!("Fetching feed {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::DataError(format!(
                "Service {} returned error {}: {}",
                url, status, body
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::DataError(format!("Reading feed {} failed: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    fn local_path(&self, url: &str) -> PathBuf {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[async_trait]
impl FeedLoader for SourceFeedLoader {
    async fn load(&self, feed: &FeedInfo) -> Result<RowSet, ApiError> {
        let url = substitute_url_macros(&feed.url, Utc::now());
        if url.trim().is_empty() {
            return Err(ApiError::ConfigurationError(format!(
                "Feed {} has incorrect url",
                feed.name
            )));
        }
        info!(feed = %feed.name, url = %url, "Loading feed");

        let lower = url.to_ascii_lowercase();
        let raw = if lower.starts_with("http://") || lower.starts_with("https://") {
            self.fetch(&url).await?
        } else if lower.contains("://") && !lower.starts_with("file://") {
            return Err(ApiError::ConfigurationError(format!(
                "Unknown protocol '{}' for feed '{}'",
                url, feed.name
            )));
        } else {
            let path = self.local_path(&url);
            tokio::fs::read(&path).await.map_err(|e| {
                ApiError::DataError(format!(
                    "Reading feed {} from {} failed: {}",
                    feed.name,
                    path.display(),
                    e
                ))
            })?
        };

        let file_name = url_file_name(&url);
        let raw = if file_name.ends_with(".zip") {
            unzip_first_entry(&raw, &url)?
        } else {
            raw
        };
        let text = decode(raw, feed)?;
        let rows = parse_content(&text, feed, file_name)?;
        debug!(feed = %feed.name, rows = rows.row_count(), columns = ?rows.columns(), "Feed loaded");
        Ok(rows)
    }
}

/// Replace `%Y`, `%y`, `%m` and `%d` in a feed URL with the current date.
pub fn substitute_url_macros(url: &str, now: DateTime<Utc>) -> String {
    url.replace("%d", &now.format("%d").to_string())
        .replace("%m", &now.format("%m").to_string())
        .replace("%Y", &now.format("%Y").to_string())
        .replace("%y", &now.format("%y").to_string())
}

fn url_file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

fn unzip_first_entry(raw: &[u8], url: &str) -> Result<Vec<u8>, ApiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(raw)).map_err(|e| {
        ApiError::DataError(format!("A file returned by {} cannot be parsed as zip: {}", url, e))
    })?;
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        return Ok(content);
    }
    Err(ApiError::DataError(format!("An archive returned by {} is empty", url)))
}

fn decode(raw: Vec<u8>, feed: &FeedInfo) -> Result<String, ApiError> {
    match feed.charset.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("utf-8") | Some("utf8") => String::from_utf8(raw).map_err(|e| {
            ApiError::DataError(format!("Feed {} is not valid UTF-8: {}", feed.name, e))
        }),
        Some(other) => Err(ApiError::ConfigurationError(format!(
            "Feed {} declares unsupported charset '{}'",
            feed.name, other
        ))),
    }
}

/// Resolve `Auto` by file extension, then by the first non-blank character of the content.
pub fn detect_type(feed: &FeedInfo, file_name: &str, text: &str) -> Result<FeedType, ApiError> {
    if feed.feed_type != FeedType::Auto {
        return Ok(feed.feed_type);
    }
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".json") {
        return Ok(FeedType::Json);
    }
    if lower.ends_with(".jsonl") || lower.ends_with(".ndjson") {
        return Ok(FeedType::JsonLines);
    }
    if lower.ends_with("csv") {
        return Ok(FeedType::Csv);
    }
    match text.trim_start().chars().next() {
        Some('[') => Ok(FeedType::Json),
        Some('{') => {
            let first_line = text.trim_start().lines().next().unwrap_or_default();
            if first_line.trim_end().ends_with('}') && text.trim().lines().count() > 1 {
                Ok(FeedType::JsonLines)
            } else {
                Ok(FeedType::Json)
            }
        }
        Some(_) => Ok(FeedType::Csv),
        None => Err(ApiError::DataError(format!(
            "Feed {} is empty, its format can't be detected",
            feed.name
        ))),
    }
}

/// Parse feed text according to its (possibly detected) type.
pub fn parse_content(text: &str, feed: &FeedInfo, file_name: &str) -> Result<RowSet, ApiError> {
    let feed_type = detect_type(feed, file_name, text)?;
    debug!(feed = %feed.name, feed_type = ?feed_type, "Feed type detected");
    match feed_type {
        FeedType::Json | FeedType::Auto => parse_json(text, feed),
        FeedType::JsonLines => parse_json_lines(text, feed),
        FeedType::Csv => parse_csv(text, feed),
    }
}

fn parse_json(text: &str, feed: &FeedInfo) -> Result<RowSet, ApiError> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        ApiError::DataError(format!("Feed {} cannot be parsed as JSON: {}", feed.name, e))
    })?;
    let values = match json {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    RowSet::from_json_values(values)
        .map_err(|e| ApiError::DataError(format!("Feed {}: {}", feed.name, e)))
}

fn parse_json_lines(text: &str, feed: &FeedInfo) -> Result<RowSet, ApiError> {
    let mut values = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|e| {
            ApiError::DataError(format!(
                "Feed {} line {} cannot be parsed as JSON: {}",
                feed.name,
                idx + 1,
                e
            ))
        })?;
        values.push(value);
    }
    RowSet::from_json_values(values)
        .map_err(|e| ApiError::DataError(format!("Feed {}: {}", feed.name, e)))
}

fn parse_csv(text: &str, feed: &FeedInfo) -> Result<RowSet, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let mut row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.to_string())))
            .collect();
        coerce_numbers(&mut row);
        rows.push(row);
    }
    RowSet::from_rows(rows).map_err(|e| ApiError::DataError(format!("Feed {}: {}", feed.name, e)))
}
