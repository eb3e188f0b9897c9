//! Archive-backed platform
//!
//! Reads the latest cached archive of a campaign (`sdf-<advertiser>-<campaign>-<unix_ms>.zip`,
//! latest by name) and keeps status changes in memory. [`LocalPlatform::save`] writes changed
//! structures back as newer archives so a following run sees them.

use super::{archive_file_name, archive_prefix, EntityStatus, PlatformFacade};
use crate::config::PlatformConfig;
use crate::error::ApiError;
use crate::sdf::fields::status;
use crate::sdf::{read_archive, write_archive, EntityKind, SdfStructure};
use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory downloaded archives are cached in.
pub fn cache_dir(config: &PlatformConfig) -> PathBuf {
    config
        .cache_dir
        .clone()
        .or_else(|| ProjectDirs::from("", "", "triggerator").map(|d| d.cache_dir().to_path_buf()))
        .unwrap_or_else(|| std::env::temp_dir().join("triggerator"))
}

/// Latest cached archive of a campaign, if any.
pub fn find_cached_archive(
    dir: &Path,
    advertiser_id: &str,
    campaign_id: &str,
) -> Result<Option<PathBuf>, ApiError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let prefix = format!("{}-", archive_prefix(advertiser_id, campaign_id));
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) && name.ends_with(".zip") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names.pop().map(|name| dir.join(name)))
}

type CampaignKey = (String, String);

pub struct LocalPlatform {
    dir: PathBuf,
    structures: Mutex<BTreeMap<CampaignKey, SdfStructure>>,
    changed: Mutex<BTreeSet<CampaignKey>>,
}

impl LocalPlatform {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            structures: Mutex::new(BTreeMap::new()),
            changed: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self::new(cache_dir(config))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current in-memory state of a downloaded campaign.
    pub fn structure(&self, advertiser_id: &str, campaign_id: &str) -> Option<SdfStructure> {
        self.structures
            .lock()
            .get(&(advertiser_id.to_string(), campaign_id.to_string()))
            .cloned()
    }

    /// Write every structure with status changes as a new archive; returns the written paths.
    pub fn save(&self) -> Result<Vec<PathBuf>, ApiError> {
        let changed = std::mem::take(&mut *self.changed.lock());
        let structures = self.structures.lock();
        let mut written = Vec::new();
        for key in changed {
            let Some(structure) = structures.get(&key) else {
                continue;
            };
            let path = self.dir.join(archive_file_name(
                &key.0,
                &key.1,
                Utc::now().timestamp_millis(),
            ));
            write_archive(structure, &path)?;
            written.push(path);
        }
        Ok(written)
    }

    fn set_status(
        &self,
        kind: EntityKind,
        advertiser_id: &str,
        id: &str,
        value: EntityStatus,
    ) -> Result<(), ApiError> {
        let mut structures = self.structures.lock();
        for (key, structure) in structures.iter_mut() {
            if key.0 != advertiser_id {
                continue;
            }
            let Some(table) = structure.table_mut(kind) else {
                continue;
            };
            if let Some(index) = table.position(id) {
                table.set(status::COLUMN, index, value.as_str())?;
                self.changed.lock().insert(key.clone());
                info!(entity = %kind, id, status = %value, "Entity status updated locally");
                return Ok(());
            }
        }
        Err(ApiError::PlatformApiError(format!(
            "{} {} of advertiser {} not found in downloaded campaigns",
            kind, id, advertiser_id
        )))
    }
}

#[async_trait]
impl PlatformFacade for LocalPlatform {
    async fn download_structure(
        &self,
        advertiser_id: &str,
        campaign_id: &str,
    ) -> Result<SdfStructure, ApiError> {
        let key = (advertiser_id.to_string(), campaign_id.to_string());
        if let Some(structure) = self.structures.lock().get(&key) {
            return Ok(structure.clone());
        }
        let path = find_cached_archive(&self.dir, advertiser_id, campaign_id)?.ok_or_else(|| {
            ApiError::PlatformApiError(format!(
                "No cached archive for campaign {} of advertiser {} in {}",
                campaign_id,
                advertiser_id,
                self.dir.display()
            ))
        })?;
        debug!(path = %path.display(), "Reading campaign from local cache");
        let structure = read_archive(&path, advertiser_id)?;
        self.structures.lock().insert(key, structure.clone());
        Ok(structure)
    }

    async fn set_insertion_order_status(
        &self,
        advertiser_id: &str,
        insertion_order_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        self.set_status(
            EntityKind::InsertionOrder,
            advertiser_id,
            insertion_order_id,
            status,
        )
    }

    async fn set_line_item_status(
        &self,
        advertiser_id: &str,
        line_item_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        self.set_status(EntityKind::LineItem, advertiser_id, line_item_id, status)
    }
}
