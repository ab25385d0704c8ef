//! Evaluation runs
//!
//! One run: build a scheduler, evaluate an entry unit to a root frame, look up the
//! result path on it, drain the queue, and tear everything down.

use crate::config::EngineConfig;
use crate::error::{EngineError, EvalError};
use crate::future::Future;
use crate::lookup::Lookup;
use crate::scheduler::external::{EnvironmentResolver, FileResolver};
use crate::scheduler::report::ErrorSink;
use crate::scheduler::Scheduler;
use crate::source::SourceRef;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(Value),
    Failed { errors: usize, deadlock: bool },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// Text form of a successful result.
    pub fn render(&self) -> Option<String> {
        match self {
            Outcome::Value(value) => value.render_scalar(),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Outcome::Value(value) => serde_json::json!({
                "result": value.to_json(),
            }),
            Outcome::Failed { errors, deadlock } => serde_json::json!({
                "errors": errors,
                "deadlock": deadlock,
            }),
        }
    }
}

/// A single evaluation run.
pub struct Evaluation {
    scheduler: Scheduler,
    config: EngineConfig,
    // Background file reads; dropped after the scheduler is shut down.
    runtime: Option<tokio::runtime::Runtime>,
}

impl Evaluation {
    pub fn new(config: EngineConfig, sink: Arc<dyn ErrorSink>) -> Result<Self, EngineError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        let scheduler = Scheduler::with_config(config.scheduler.clone(), sink);
        if config.resolvers.environment {
            scheduler.add_resolver(Arc::new(EnvironmentResolver));
        }
        let mut runtime = None;
        if config.resolvers.files {
            if let Some(root) = &config.resolvers.file_root {
                let resolver = if config.resolvers.file_threads {
                    let background = tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(1)
                        .thread_name("frameval-io")
                        .enable_all()
                        .build()?;
                    let resolver = FileResolver::on_runtime(root.clone(), background.handle().clone());
                    runtime = Some(background);
                    resolver
                } else {
                    FileResolver::new(root.clone())
                };
                scheduler.add_resolver(Arc::new(resolver));
            }
        }
        Ok(Evaluation {
            scheduler,
            config,
            runtime,
        })
    }

    /// The scheduler for building the entry unit and registering resolvers.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Evaluate `entry`, which must produce the root frame.
    pub fn run(self, entry: Future) -> Outcome {
        info!(result_path = %self.config.scheduler.result_path, "Starting evaluation");
        let result: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let slot = result.clone();
        let scheduler = self.scheduler.clone();
        let location = SourceRef::native("root result");
        let path = self.config.scheduler.result_path.clone();

        entry.listen(move |root| {
            let Some(id) = root.as_frame() else {
                scheduler.report(EvalError::evaluation(
                    &location,
                    format!("The entry point produced {} instead of a frame.", root.kind()),
                ));
                return;
            };
            let Some(frame) = scheduler.frame(id) else {
                return;
            };
            let names: Vec<&str> = path.split('.').collect();
            let lookup = Lookup::create(&scheduler, &location, frame.context(), &names);
            let reporter = scheduler.clone();
            let refused = location.clone();
            lookup.listen(move |value| {
                if value.render_scalar().is_none() {
                    reporter.report(EvalError::evaluation(
                        &refused,
                        format!("Cannot render a result of type {}.", value.kind()),
                    ));
                    return;
                }
                *slot.lock() = Some(value);
            });
        });

        let drain = self.scheduler.run_to_completion();
        let errors = self.scheduler.error_count();
        let value = result.lock().take();
        info!(
            executed = drain.executed,
            errors,
            deadlock = drain.deadlock,
            frames = self.scheduler.frame_count(),
            "Evaluation finished"
        );
        match value {
            Some(value) if errors == 0 => Outcome::Value(value),
            _ => Outcome::Failed {
                errors,
                deadlock: self.scheduler.deadlocked(),
            },
        }
    }
}

impl Drop for Evaluation {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
