//! Workspace config file sources: `triggerator.{toml,yaml,json}` at the workspace root, then
//! `config/config.toml` and `config/{TRIGGERATOR_ENV}.toml`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

const ROOT_FILE_STEM: &str = "triggerator";
const ROOT_FILE_EXTENSIONS: [&str; 3] = ["toml", "yaml", "json"];

/// Existing workspace config files, lowest precedence first.
pub fn workspace_config_paths(workspace_root: &Path) -> Vec<PathBuf> {
    let env_name = std::env::var("TRIGGERATOR_ENV").unwrap_or_else(|_| "development".to_string());
    let config_dir = workspace_root.join("config");

    ROOT_FILE_EXTENSIONS
        .iter()
        .map(|ext| workspace_root.join(format!("{}.{}", ROOT_FILE_STEM, ext)))
        .chain([
            config_dir.join("config.toml"),
            config_dir.join(format!("{}.toml", env_name)),
        ])
        .filter(|path| path.is_file())
        .collect()
}

/// Add workspace config files to builder; the format follows each file's extension.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = workspace_config_paths(workspace_root)
        .into_iter()
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Adding workspace configuration");
            builder.add_source(File::from(path).required(false))
        });
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_root_file_precedes_config_dir() {
        let temp = TempDir::new().unwrap();
        assert!(workspace_config_paths(temp.path()).is_empty());

        std::fs::write(temp.path().join("triggerator.yaml"), "rules: []\n").unwrap();
        std::fs::create_dir_all(temp.path().join("config")).unwrap();
        std::fs::write(temp.path().join("config").join("config.toml"), "").unwrap();
        let paths = workspace_config_paths(temp.path());
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("triggerator.yaml"));
        assert!(paths[1].ends_with("config/config.toml"));
    }
}
