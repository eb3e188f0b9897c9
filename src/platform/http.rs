//! REST platform client
//!
//! Downloads run as an export task: create the task, poll its operation until done, fetch the
//! produced media. The archive is written to the cache directory before it is read, and removed
//! afterwards unless downloads are kept.

use super::{archive_file_name, EntityStatus, PlatformFacade};
use crate::config::PlatformConfig;
use crate::error::ApiError;
use crate::sdf::{read_archive, SdfStructure};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const API_VERSION: &str = "v1";
const ACCESS_TOKEN_ENV: &str = "TRIGGERATOR_ACCESS_TOKEN";
const EXPORTED_FILE_TYPES: [&str; 5] = [
    "FILE_TYPE_CAMPAIGN",
    "FILE_TYPE_INSERTION_ORDER",
    "FILE_TYPE_LINE_ITEM",
    "FILE_TYPE_AD_GROUP",
    "FILE_TYPE_AD",
];

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationStatus>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    resource_name: String,
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        match status.as_u16() {
            401 | 403 => ApiError::PlatformAuthFailed(format!("Authentication failed: {}", error)),
            429 => ApiError::PlatformRateLimit(format!("Rate limit exceeded: {}", error)),
            _ => ApiError::PlatformApiError(format!(
                "Request failed with status {}: {}",
                status, error
            )),
        }
    } else if error.is_timeout() {
        ApiError::PlatformApiError(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::PlatformApiError(format!("Connection error: {}", error))
    } else {
        ApiError::PlatformApiError(format!("HTTP error: {}", error))
    }
}

/// Turn a non-success response into an error carrying its body.
async fn check_response(response: Response, operation: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(match status.as_u16() {
        401 | 403 => ApiError::PlatformAuthFailed(format!("{}: {}", operation, error_text)),
        429 => ApiError::PlatformRateLimit(format!("{}: {}", operation, error_text)),
        404 => ApiError::PlatformApiError(format!("{}: not found: {}", operation, error_text)),
        _ => ApiError::PlatformApiError(format!(
            "{} failed with status {}: {}",
            operation, status, error_text
        )),
    })
}

/// Platform client over the REST API.
pub struct HttpPlatformClient {
    client: Client,
    base_url: String,
    access_token: String,
    polling_interval: Duration,
    max_wait: Duration,
    cache_dir: PathBuf,
    keep_downloads: bool,
}

impl HttpPlatformClient {
    /// Client for the configured endpoint. The access token comes from configuration or
    /// `TRIGGERATOR_ACCESS_TOKEN`.
    pub fn new(config: &PlatformConfig) -> Result<Self, ApiError> {
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                ApiError::ConfigurationError(format!(
                    "Platform access token is not configured (set platform.access_token or {})",
                    ACCESS_TOKEN_ENV
                ))
            })?;
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ApiError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
            polling_interval: Duration::from_millis(config.polling_interval_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
            cache_dir: super::local::cache_dir(config),
            keep_downloads: config.keep_downloads,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path)
    }

    async fn create_download_task(
        &self,
        advertiser_id: &str,
        campaign_id: &str,
    ) -> Result<Operation, ApiError> {
        let operation = format!("sdfdownloadtasks.create for campaign {}", campaign_id);
        let request = json!({
            "advertiserId": advertiser_id,
            "parentEntityFilter": {
                "fileType": EXPORTED_FILE_TYPES,
                "filterType": "FILTER_TYPE_CAMPAIGN_ID",
                "filterIds": [campaign_id],
            },
        });
        let response = self
            .client
            .post(self.api_url("sdfdownloadtasks"))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;
        let task: Operation = check_response(response, &operation)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::PlatformApiError(format!("Failed to parse operation: {}", e)))?;
        operation_error(&task, &operation)?;
        Ok(task)
    }

    /// Poll until the export is done and return the produced resource name.
    async fn wait_for_export(&self, name: &str) -> Result<String, ApiError> {
        let started = Instant::now();
        loop {
            let response = self
                .client
                .get(self.api_url(name))
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(map_http_error)?;
            let operation: Operation = check_response(response, name)
                .await?
                .json()
                .await
                .map_err(|e| {
                    ApiError::PlatformApiError(format!("Failed to parse operation: {}", e))
                })?;
            operation_error(&operation, name)?;
            if operation.done {
                let resource = operation
                    .response
                    .map(|r| r.resource_name)
                    .ok_or_else(|| {
                        ApiError::PlatformApiError(format!(
                            "Operation {} completed without a resource",
                            name
                        ))
                    })?;
                info!(
                    operation = %name,
                    resource = %resource,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Export completed"
                );
                return Ok(resource);
            }
            if started.elapsed() >= self.max_wait {
                return Err(ApiError::PlatformTimeout {
                    operation: name.to_string(),
                    timeout_secs: self.max_wait.as_secs(),
                });
            }
            debug!(operation = %name, "Export not ready yet");
            tokio::time::sleep(self.polling_interval).await;
        }
    }

    async fn download_media(&self, resource_name: &str) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}/download/{}", self.base_url, resource_name);
        let response = self
            .client
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(map_http_error)?;
        let bytes = check_response(response, resource_name)
            .await?
            .bytes()
            .await
            .map_err(map_http_error)?;
        Ok(bytes.to_vec())
    }

    async fn patch_status(
        &self,
        path: String,
        entity: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        let operation = format!("{} status update", entity);
        let response = self
            .client
            .patch(self.api_url(&path))
            .query(&[("updateMask", "entityStatus")])
            .bearer_auth(&self.access_token)
            .json(&json!({ "entityStatus": status.api_value() }))
            .send()
            .await
            .map_err(map_http_error)?;
        let updated: serde_json::Value = check_response(response, &operation)
            .await?
            .json()
            .await
            .unwrap_or_default();
        info!(
            entity = %entity,
            name = %updated.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
            entity_status = %status.api_value(),
            "Entity status updated"
        );
        Ok(())
    }
}

fn operation_error(operation: &Operation, context: &str) -> Result<(), ApiError> {
    match &operation.error {
        Some(status) => Err(ApiError::PlatformApiError(format!(
            "{} failed: code={}, message={}",
            context,
            status.code.unwrap_or_default(),
            status.message.as_deref().unwrap_or_default()
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl PlatformFacade for HttpPlatformClient {
    async fn download_structure(
        &self,
        advertiser_id: &str,
        campaign_id: &str,
    ) -> Result<SdfStructure, ApiError> {
        if advertiser_id.is_empty() || campaign_id.is_empty() {
            return Err(ApiError::ConfigurationError(
                "Advertiser id and campaign id are required to download a campaign".to_string(),
            ));
        }
        info!(advertiser_id, campaign_id, "Starting campaign export");
        let task = self.create_download_task(advertiser_id, campaign_id).await?;
        let resource = self.wait_for_export(&task.name).await?;
        let bytes = self.download_media(&resource).await?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let path = self.cache_dir.join(archive_file_name(
            advertiser_id,
            campaign_id,
            Utc::now().timestamp_millis(),
        ));
        tokio::fs::write(&path, &bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved exported archive");

        let structure = read_archive(&path, advertiser_id);
        if !self.keep_downloads {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete downloaded archive");
            }
        }
        let structure = structure?;
        info!(
            insertion_orders = structure.count(crate::sdf::EntityKind::InsertionOrder),
            line_items = structure.count(crate::sdf::EntityKind::LineItem),
            "Campaign structure downloaded"
        );
        Ok(structure)
    }

    async fn set_insertion_order_status(
        &self,
        advertiser_id: &str,
        insertion_order_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        self.patch_status(
            format!(
                "advertisers/{}/insertionOrders/{}",
                advertiser_id, insertion_order_id
            ),
            &format!("InsertionOrder {}", insertion_order_id),
            status,
        )
        .await
    }

    async fn set_line_item_status(
        &self,
        advertiser_id: &str,
        line_item_id: &str,
        status: EntityStatus,
    ) -> Result<(), ApiError> {
        self.patch_status(
            format!("advertisers/{}/lineItems/{}", advertiser_id, line_item_id),
            &format!("LineItem {}", line_item_id),
            status,
        )
        .await
    }
}
