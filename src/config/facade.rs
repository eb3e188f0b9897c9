//! Config loader facade: builds the layered source stack and deserializes the root config.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::TriggeratorConfig;
use crate::error::ApiError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

/// Loads `TriggeratorConfig` from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, `triggerator.{toml,yaml,json}`,
    /// `config/config.toml`, `config/{TRIGGERATOR_ENV}.toml`, `TRIGGERATOR__*` environment
    /// variables.
    pub fn load(workspace_root: &Path) -> Result<TriggeratorConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(
                Environment::with_prefix("TRIGGERATOR")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let resolved: TriggeratorConfig = config.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            rules = resolved.rules.len(),
            feeds = resolved.feeds.feeds.len(),
            "Configuration loaded"
        );
        Ok(resolved)
    }

    /// Load configuration from a single file (format inferred from the extension).
    pub fn load_from_file(path: &Path) -> Result<TriggeratorConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigurationError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
