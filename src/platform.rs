//! Platform Facade
//!
//! The campaign platform as seen by the runtime path: download a campaign's live structure and
//! flip insertion order or line item status. [`HttpPlatformClient`] talks to the REST API;
//! [`LocalPlatform`] serves structures from downloaded archives and applies status changes in
//! memory, which is what offline runs and tests use.

use crate::error::ApiError;
use crate::sdf::SdfStructure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub mod local;

pub use http::HttpPlatformClient;
pub use local::LocalPlatform;

/// Entity status the runtime path can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityStatus {
    Active,
    Paused,
}

impl EntityStatus {
    /// Value of the `Status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => crate::sdf::fields::status::ACTIVE,
            EntityStatus::Paused => crate::sdf::fields::status::PAUSED,
        }
    }

    /// Value of the REST API `entityStatus` field.
    pub fn api_value(&self) -> &'static str {
        match self {
            EntityStatus::Active => "ENTITY_STATUS_ACTIVE",
            EntityStatus::Paused => "ENTITY_STATUS_PAUSED",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the runtime path needs from the platform.
#[async_trait]
pub trait PlatformFacade: Send + Sync {
    /// Live structure of a campaign, with every entity level the platform exports.
    async fn download_structure(
        &self,
        advertiser_id: &str,
        campaign_id: &str,
    ) -> Result<SdfStructure, ApiError>;

    async fn set_insertion_order_status(
        &self,
        advertiser_id: &str,
        insertion_order_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError>;

    async fn set_line_item_status(
        &self,
        advertiser_id: &str,
        line_item_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError>;
}

/// File name a downloaded archive is cached under.
pub fn archive_file_name(advertiser_id: &str, campaign_id: &str, unix_ms: i64) -> String {
    format!("{}-{}.zip", archive_prefix(advertiser_id, campaign_id), unix_ms)
}

/// Prefix shared by every cached archive of a campaign.
pub fn archive_prefix(advertiser_id: &str, campaign_id: &str) -> String {
    format!("sdf-{}-{}", advertiser_id, campaign_id)
}

/// Recording platform double
#[cfg(test)]
pub struct MockPlatform {
    structure: SdfStructure,
    calls: parking_lot::Mutex<Vec<(String, String, EntityStatus)>>,
    fail_after: Option<usize>,
}

#[cfg(test)]
impl MockPlatform {
    pub fn new(structure: SdfStructure) -> Self {
        Self {
            structure,
            calls: parking_lot::Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    /// Fail every status change after the first `count`.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// `(entity, id, status)` of every accepted status change.
    pub fn calls(&self) -> Vec<(String, String, EntityStatus)> {
        self.calls.lock().clone()
    }

    fn record(&self, entity: &str, id: &str, status: EntityStatus) -> Result<(), ApiError> {
        let mut calls = self.calls.lock();
        if self.fail_after.is_some_and(|limit| calls.len() >= limit) {
            return Err(ApiError::PlatformApiError(format!(
                "{} {} could not be updated",
                entity, id
            )));
        }
        calls.push((entity.to_string(), id.to_string(), status));
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl PlatformFacade for MockPlatform {
    async fn download_structure(
        &self,
        _advertiser_id: &str,
        _campaign_id: &str,
    ) -> Result<SdfStructure, ApiError> {
        Ok(self.structure.clone())
    }

    async fn set_insertion_order_status(
        &self,
        _advertiser_id: &str,
        insertion_order_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        self.record("IO", insertion_order_id, status)
    }

    async fn set_line_item_status(
        &self,
        _advertiser_id: &str,
        line_item_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        self.record("LI", line_item_id, status)
    }
}
