//! Configuration System
//!
//! Layered engine configuration: built-in defaults, the user's global file, the
//! workspace's `config/` files, then `FRAMEVAL__`-prefixed environment variables.

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use crate::types::verify_symbol;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub resolvers: ResolverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Run-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dotted path looked up on the root frame to produce the run's result
    #[serde(default = "default_result_path")]
    pub result_path: String,

    /// Maximum number of blocked lookups listed in one deadlock report
    #[serde(default = "default_deadlock_report_limit")]
    pub deadlock_report_limit: usize,
}

fn default_result_path() -> String {
    "value".to_string()
}

fn default_deadlock_report_limit() -> usize {
    32
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            result_path: default_result_path(),
            deadlock_report_limit: default_deadlock_report_limit(),
        }
    }
}

/// Which external resolvers a run installs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_true")]
    pub environment: bool,

    #[serde(default)]
    pub files: bool,

    /// Directory `file:` names are resolved under
    #[serde(default)]
    pub file_root: Option<PathBuf>,

    /// Read files on a worker thread
    #[serde(default = "default_true")]
    pub file_threads: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            environment: true,
            files: false,
            file_root: None,
            file_threads: true,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Scheduler(String),
    Resolver(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Scheduler(msg) => write!(f, "Scheduler: {}", msg),
            ValidationError::Resolver(msg) => write!(f, "Resolver: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.result_path.is_empty() {
            return Err("Result path cannot be empty".to_string());
        }
        for segment in self.result_path.split('.') {
            verify_symbol(segment)?;
        }
        if self.deadlock_report_limit == 0 {
            return Err("Deadlock report limit must be at least 1".to_string());
        }
        Ok(())
    }

    /// Segments of the result path.
    pub fn result_names(&self) -> Vec<&str> {
        self.result_path.split('.').collect()
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.files && self.file_root.is_none() {
            return Err("File resolver enabled without a file_root".to_string());
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.scheduler.validate() {
            errors.push(ValidationError::Scheduler(e));
        }
        if let Err(e) = self.resolvers.validate() {
            errors.push(ValidationError::Resolver(e));
        }
        if !matches!(self.logging.format.as_str(), "json" | "text") {
            errors.push(ValidationError::Logging(format!(
                "Invalid log format: {}",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`EngineConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<EngineConfig, EngineError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("FRAMEVAL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );
        let config: EngineConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from one file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, EngineError> {
        let config = Config::builder()
            .add_source(File::from(path.to_path_buf()))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn xdg_config_path() -> Option<PathBuf> {
        global_config_path()
    }
}
