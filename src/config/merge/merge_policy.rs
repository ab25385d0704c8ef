//! Defaults layered beneath every other source, taken from the typed defaults so
//! the two cannot drift apart.

use crate::config::{ResolverConfig, SchedulerConfig};
use crate::logging::LoggingConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let scheduler = SchedulerConfig::default();
    let resolvers = ResolverConfig::default();
    let logging = LoggingConfig::default();

    Config::builder()
        .set_default("scheduler.result_path", scheduler.result_path)?
        .set_default(
            "scheduler.deadlock_report_limit",
            scheduler.deadlock_report_limit as i64,
        )?
        .set_default("resolvers.environment", resolvers.environment)?
        .set_default("resolvers.files", resolvers.files)?
        .set_default("resolvers.file_threads", resolvers.file_threads)?
        .set_default("logging.level", logging.level)?
        .set_default("logging.format", logging.format)?
        .set_default("logging.output", logging.output)
}
