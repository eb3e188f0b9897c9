//! Feeds
//!
//! Loading feed sources in parallel and joining them into the single row set every rule is
//! evaluated against.

mod join;
mod loader;

pub use join::FeedJoinEngine;
pub use loader::{detect_type, parse_content, substitute_url_macros, FeedLoader, SourceFeedLoader};

use crate::config::FeedConfig;
use crate::error::ApiError;
use crate::rowset::RowSet;
use futures::future::try_join_all;
use tracing::info;

/// Load every configured feed concurrently and join them.
pub async fn load_all(config: &FeedConfig, loader: &dyn FeedLoader) -> Result<RowSet, ApiError> {
    if config.feeds.is_empty() {
        return Err(ApiError::ConfigurationError(
            "Feed configuration contains no feeds".to_string(),
        ));
    }
    let loaded = try_join_all(config.feeds.iter().map(|feed| loader.load(feed))).await?;
    info!(feeds = loaded.len(), "Feeds loaded");
    let pairs = config.feeds.iter().cloned().zip(loaded).collect();
    FeedJoinEngine::new(pairs).join()
}
