//! Workspace files: `config/config.toml`, then `config/<FRAMEVAL_ENV>.toml`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_ENVIRONMENT: &str = "development";

/// Candidate files in increasing precedence.
fn candidates(workspace_root: &Path) -> [PathBuf; 2] {
    let dir = workspace_root.join("config");
    let environment =
        std::env::var("FRAMEVAL_ENV").unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string());
    [
        dir.join("config.toml"),
        dir.join(format!("{}.toml", environment)),
    ]
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = candidates(workspace_root)
        .into_iter()
        .filter(|path| path.is_file())
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Adding workspace configuration");
            builder.add_source(File::from(path).required(false))
        });
    Ok(builder)
}
