//! Logging
//!
//! The engine only emits `tracing` events. A host that wants to see them calls
//! [`init_logging`] once; environment variables take precedence over configuration:
//!
//! - `FRAMEVAL_LOG`: a full `EnvFilter` directive string
//! - `FRAMEVAL_LOG_FORMAT`: `json` or `text`
//! - `FRAMEVAL_LOG_OUTPUT`: `stdout`, `stderr` or `file`
//! - `FRAMEVAL_LOG_MODULES`: extra `module=level` directives, comma separated

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Install a subscriber at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base level: trace, debug, info, warn, error, off
    #[serde(default = "default_level")]
    pub level: String,

    /// json or text
    #[serde(default = "default_format")]
    pub format: String,

    /// stdout, stderr or file
    #[serde(default = "default_output")]
    pub output: String,

    /// Used when output is "file"
    #[serde(default = "default_file")]
    pub file: PathBuf,

    /// ANSI colors for text written to a terminal stream
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_file() -> PathBuf {
    PathBuf::from("frameval.log")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: default_format(),
            output: default_output(),
            file: default_file(),
            color: true,
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Text,
}

impl Format {
    fn parse(format: &str) -> Result<Self, EngineError> {
        match format {
            "json" => Ok(Format::Json),
            "text" => Ok(Format::Text),
            other => Err(EngineError::Config(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Stdout,
    Stderr,
    File,
}

impl Output {
    fn parse(output: &str) -> Result<Self, EngineError> {
        match output {
            "stdout" => Ok(Output::Stdout),
            "stderr" => Ok(Output::Stderr),
            "file" => Ok(Output::File),
            other => Err(EngineError::Config(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
                other
            ))),
        }
    }
}

/// Install the global subscriber described by `config` and the environment.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), EngineError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);
    if !config.enabled {
        return Ok(());
    }

    let filter = env_filter(config)?;
    // An unparsable format override falls back to the configured one.
    let format = std::env::var("FRAMEVAL_LOG_FORMAT")
        .ok()
        .and_then(|value| Format::parse(&value).ok())
        .map_or_else(|| Format::parse(&config.format), Ok)?;
    let output = match std::env::var("FRAMEVAL_LOG_OUTPUT") {
        Ok(value) => Output::parse(&value)?,
        Err(_) => Output::parse(&config.output)?,
    };

    let writer = match output {
        Output::Stdout => BoxMakeWriter::new(std::io::stdout),
        Output::Stderr => BoxMakeWriter::new(std::io::stderr),
        Output::File => BoxMakeWriter::new(Mutex::new(open_log_file(&config.file)?)),
    };
    let ansi = config.color && output != Output::File;

    let registry = Registry::default().with(filter);
    let installed = match format {
        Format::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        Format::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|e| EngineError::Config(format!("Failed to install logger: {}", e)))
}

fn open_log_file(path: &Path) -> Result<std::fs::File, EngineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?)
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, EngineError> {
    if let Ok(filter) = EnvFilter::try_from_env("FRAMEVAL_LOG") {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let from_env = std::env::var("FRAMEVAL_LOG_MODULES").unwrap_or_default();
    let extra = from_env
        .split(',')
        .filter_map(|spec| spec.split_once('='))
        .map(|(module, level)| (module.trim().to_string(), level.trim().to_string()));

    config
        .modules
        .iter()
        .map(|(module, level)| (module.clone(), level.clone()))
        .chain(extra)
        .try_fold(EnvFilter::new(&config.level), |filter, (module, level)| {
            let directive = format!("{}={}", module, level)
                .parse::<Directive>()
                .map_err(|e| EngineError::Config(format!("Invalid log directive: {}", e)))?;
            Ok(filter.add_directive(directive))
        })
}
