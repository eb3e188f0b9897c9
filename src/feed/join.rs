//! Feed join engine: denormalizes independently loaded feeds into one row set by following each
//! feed's `external_key` reference.

use crate::config::FeedInfo;
use crate::error::ApiError;
use crate::rowset::{value_text, Row, RowSet};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// A merged result and the feed names folded into it.
struct Merged {
    rows: RowSet,
    sources: BTreeSet<String>,
}

pub struct FeedJoinEngine {
    feeds: Vec<(FeedInfo, RowSet)>,
}

impl FeedJoinEngine {
    pub fn new(feeds: Vec<(FeedInfo, RowSet)>) -> Self {
        Self { feeds }
    }

    /// Join every feed into the root feed's rows.
    pub fn join(self) -> Result<RowSet, ApiError> {
        let mut feeds = self.feeds;
        match feeds.len() {
            0 => {
                return Err(ApiError::ConfigurationError(
                    "Feed configuration contains no feeds".to_string(),
                ))
            }
            1 => {
                let (info, mut rows) = feeds.remove(0);
                add_snapshot_fields(&info.name, &mut rows);
                return Ok(rows);
            }
            _ => {}
        }

        debug!(
            feeds = feeds.len(),
            rows = ?feeds.iter().map(|(_, r)| r.row_count()).collect::<Vec<_>>(),
            "Joining feeds"
        );

        let roots: Vec<&str> = feeds
            .iter()
            .filter(|(info, _)| info.is_root())
            .map(|(info, _)| info.name.as_str())
            .collect();
        let root_name = match roots.as_slice() {
            [root] => root.to_string(),
            [] => {
                return Err(ApiError::ConfigurationError(
                    "Couldn't find a feed without an external key".to_string(),
                ))
            }
            [_, extra, ..] => {
                return Err(ApiError::ConfigurationError(format!(
                    "Found another feed without external_key '{}', while only one is permitted",
                    extra
                )))
            }
        };

        let raw: HashMap<&str, &RowSet> = feeds
            .iter()
            .map(|(info, rows)| (info.name.as_str(), rows))
            .collect();
        let mut merged: Vec<Merged> = Vec::new();
        let mut owners: HashMap<String, usize> = HashMap::new();

        if let Some((_, rows)) = feeds.iter().find(|(info, _)| info.name == root_name) {
            let mut rows = rows.clone();
            add_snapshot_fields(&root_name, &mut rows);
            merged.push(Merged {
                rows,
                sources: BTreeSet::from([root_name.clone()]),
            });
            owners.insert(root_name.clone(), 0);
        }

        for (info, rows) in &feeds {
            let Some((left_name, column)) = info.external_ref() else {
                continue;
            };
            if left_name == info.name {
                return Err(ApiError::DataError(format!(
                    "Feed {} refers to itself in its external_key ({})",
                    info.name,
                    info.external_key.as_deref().unwrap_or_default()
                )));
            }
            let left = match owners.get(left_name) {
                Some(&idx) => &merged[idx].rows,
                None => raw.get(left_name).copied().ok_or_else(|| {
                    ApiError::DataError(format!(
                        "Feed {} refers to unknown feed {} in its external_key ({})",
                        info.name,
                        left_name,
                        info.external_key.as_deref().unwrap_or_default()
                    ))
                })?,
            };
            let right = match owners.get(&info.name) {
                Some(&idx) => &merged[idx].rows,
                None => rows,
            };
            let key_column = info.key_column.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| {
                ApiError::ConfigurationError(format!("Feed {} has no key column", info.name))
            })?;

            let joined = join_pair(left, right, &info.name, key_column, column)?;
            debug!(left = left_name, right = %info.name, rows = joined.row_count(), "Joined feed");

            merged.push(Merged {
                rows: joined,
                sources: BTreeSet::from([left_name.to_string(), info.name.clone()]),
            });
            let new_idx = merged.len() - 1;
            combine_sources(&mut owners, &mut merged, left_name, new_idx);
            combine_sources(&mut owners, &mut merged, &info.name, new_idx);
        }

        let unjoined: Vec<&str> = feeds
            .iter()
            .map(|(info, _)| info.name.as_str())
            .filter(|name| !owners.contains_key(*name))
            .collect();
        if !unjoined.is_empty() {
            return Err(ApiError::DataError(format!(
                "There are feeds that weren't joined: {}",
                unjoined.join(", ")
            )));
        }

        let final_idx = owners.get(&root_name).copied().ok_or_else(|| {
            ApiError::DataError(format!("Root feed {} was not loaded", root_name))
        })?;
        let result = merged.swap_remove(final_idx).rows;
        info!(rows = result.row_count(), "All feeds were loaded and joined");
        Ok(result)
    }
}

/// Store each row's values, in order, as an array under `$<feed>`.
fn add_snapshot_fields(feed_name: &str, rows: &mut RowSet) {
    let field = format!("${}", feed_name);
    for row in rows.rows_mut() {
        let snapshot = Value::Array(row.values().cloned().collect());
        row.insert(field.clone(), snapshot);
    }
}

/// Point every name owned by the previous result of `feed_name` at `new_idx`.
fn combine_sources(
    owners: &mut HashMap<String, usize>,
    merged: &mut [Merged],
    feed_name: &str,
    new_idx: usize,
) {
    if let Some(&existing) = owners.get(feed_name) {
        let names: Vec<String> = merged[existing]
            .sources
            .iter()
            .filter(|name| !merged[new_idx].sources.contains(*name))
            .cloned()
            .collect();
        for name in names {
            merged[new_idx].sources.insert(name.clone());
            owners.insert(name, new_idx);
        }
    }
    owners.insert(feed_name.to_string(), new_idx);
}

/// Inner join of `left.column` against `right.key_column`.
///
/// Left values win on name collisions; the right value is kept as `<right>.<field>` and the right
/// row's values are snapshotted under `$<right>`.
fn join_pair(
    left: &RowSet,
    right: &RowSet,
    right_name: &str,
    key_column: &str,
    column: &str,
) -> Result<RowSet, ApiError> {
    if !left.columns().iter().any(|c| c == column) {
        return Err(ApiError::DataError(format!(
            "Feed {} references an unknown column {}",
            right_name, column
        )));
    }

    let mut lookup: HashMap<String, &Row> = HashMap::new();
    for row in right.iter() {
        if let Some(key) = row.get(key_column).filter(|v| !v.is_null()) {
            lookup.insert(value_text(key), row);
        }
    }

    let snapshot_field = format!("${}", right_name);
    let mut result = Vec::new();
    for left_row in left.iter() {
        let Some(key) = left_row.get(column).filter(|v| !v.is_null()) else {
            continue;
        };
        let Some(right_row) = lookup.get(&value_text(key)) else {
            continue;
        };
        let mut row = left_row.clone();
        let mut duplicates = Vec::new();
        for (field, value) in right_row.iter() {
            if row.contains_key(field) {
                duplicates.push((format!("{}.{}", right_name, field), value.clone()));
            } else {
                row.insert(field.clone(), value.clone());
            }
        }
        row.insert(
            snapshot_field.clone(),
            Value::Array(right_row.values().cloned().collect()),
        );
        for (field, value) in duplicates {
            row.insert(field, value);
        }
        result.push(row);
    }

    if result.is_empty() {
        if left.is_empty() && right.is_empty() {
            return Ok(left.clone_empty_schema());
        }
        return Err(ApiError::DataError(format!(
            "Joining '{}' feed produced no data",
            right_name
        )));
    }
    RowSet::from_rows(result)
}
