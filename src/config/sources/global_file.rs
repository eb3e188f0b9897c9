//! Global config file source: `$XDG_CONFIG_HOME/triggerator/config.toml`, falling back to the
//! platform config directory.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::debug;

pub fn global_config_path() -> Option<PathBuf> {
    match std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(xdg) => Some(PathBuf::from(xdg).join("triggerator").join("config.toml")),
        None => ProjectDirs::from("", "", "triggerator")
            .map(|dirs| dirs.config_dir().join("config.toml")),
    }
}

/// Add the user-level defaults file when present. Advertiser-independent settings such as
/// `platform.access_token` usually live here.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(path) = global_config_path().filter(|p| p.is_file()) else {
        debug!("No global configuration file");
        return Ok(builder);
    };
    debug!(config_path = %path.display(), "Adding global configuration");
    Ok(builder.add_source(File::from(path).required(false)))
}
