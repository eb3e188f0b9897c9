//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("platform.base_url", "https://displayvideo.googleapis.com")?
        .set_default("platform.polling_interval_ms", 1_000_i64)?
        .set_default("platform.max_wait_ms", 600_000_i64)?
        .set_default("logging.level", "info")
}
