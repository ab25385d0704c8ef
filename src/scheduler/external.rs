//! External resource resolvers
//!
//! Resolvers are consulted in registration order until one claims a name. A resolver
//! that claims a name returns the unit producing it; the scheduler caches that unit.

use super::Scheduler;
use crate::error::{EvalError, ExternalFailure};
use crate::future::Future;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// What a resolver says about one name.
#[derive(Debug)]
pub enum Resolution {
    /// Not this resolver's kind of name.
    Unclaimed,
    Claimed(Future),
    /// This resolver owns the name but cannot provide it.
    Failed(ExternalFailure),
}

pub trait ExternalResolver: Send + Sync {
    fn resolve(&self, scheduler: &Scheduler, uri: &str) -> Resolution;
}

/// `env:NAME` resolves to the variable's value, or null when unset.
#[derive(Debug, Default)]
pub struct EnvironmentResolver;

impl ExternalResolver for EnvironmentResolver {
    fn resolve(&self, scheduler: &Scheduler, uri: &str) -> Resolution {
        let Some(name) = uri.strip_prefix("env:") else {
            return Resolution::Unclaimed;
        };
        if name.is_empty() {
            return Resolution::Failed(ExternalFailure::BadName);
        }
        match std::env::var(name) {
            Ok(value) => Resolution::Claimed(Future::ready(scheduler, Value::from(value))),
            Err(std::env::VarError::NotPresent) => {
                Resolution::Claimed(Future::ready(scheduler, Value::Null))
            }
            Err(std::env::VarError::NotUnicode(_)) => {
                Resolution::Failed(ExternalFailure::Corrupt)
            }
        }
    }
}

/// `file:relative/path` under a root directory.
///
/// Text files become strings, anything else a blob. With a runtime, reads run as
/// tokio tasks and complete the unit from a worker thread.
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
    runtime: Option<Handle>,
}

impl FileResolver {
    /// Reads happen inline, during resolution.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileResolver {
            root: root.into(),
            runtime: None,
        }
    }

    /// Reads are spawned on `runtime`.
    pub fn on_runtime(root: impl Into<PathBuf>, runtime: Handle) -> Self {
        FileResolver {
            root: root.into(),
            runtime: Some(runtime),
        }
    }

    fn locate(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

fn publish(uri: &str, unit: &Future, read: std::io::Result<Vec<u8>>) {
    match read {
        Ok(bytes) => {
            let value = match String::from_utf8(bytes) {
                Ok(text) => Value::from(text),
                Err(err) => Value::Bin(Arc::from(err.into_bytes())),
            };
            debug!(uri, "Loaded file resource");
            unit.complete(value);
        }
        Err(err) => {
            warn!(uri, error = %err, "Failed to read file resource");
            unit.fail(EvalError::ExternalResource {
                uri: uri.to_string(),
                failure: ExternalFailure::Corrupt,
            });
        }
    }
}

impl ExternalResolver for FileResolver {
    fn resolve(&self, scheduler: &Scheduler, uri: &str) -> Resolution {
        let Some(relative) = uri.strip_prefix("file:") else {
            return Resolution::Unclaimed;
        };
        let Some(path) = self.locate(relative) else {
            return Resolution::Failed(ExternalFailure::BadName);
        };
        if !path.is_file() {
            return Resolution::Failed(ExternalFailure::Missing);
        }
        let unit = Future::promise(scheduler);
        match &self.runtime {
            Some(runtime) => {
                let guard = scheduler.foreign_work();
                let remote = unit.clone();
                let uri = uri.to_string();
                runtime.spawn(async move {
                    let read = tokio::fs::read(&path).await;
                    publish(&uri, &remote, read);
                    drop(guard);
                });
            }
            None => publish(uri, &unit, std::fs::read(&path)),
        }
        Resolution::Claimed(unit)
    }
}

type Builder = Arc<dyn Fn(&Scheduler) -> Future + Send + Sync>;

/// In-memory registry of `lib:` resources.
#[derive(Default)]
pub struct LibraryResolver {
    entries: RwLock<HashMap<String, Builder>>,
}

impl LibraryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` (without the `lib:` prefix).
    pub fn register<F>(&self, name: &str, builder: F)
    where
        F: Fn(&Scheduler) -> Future + Send + Sync + 'static,
    {
        self.entries
            .write()
            .insert(name.to_string(), Arc::new(builder));
    }

    /// Register a resource that is just a value.
    pub fn register_value(&self, name: &str, value: Value) {
        self.register(name, move |scheduler| Future::ready(scheduler, value.clone()));
    }
}

impl ExternalResolver for LibraryResolver {
    fn resolve(&self, scheduler: &Scheduler, uri: &str) -> Resolution {
        let Some(name) = uri.strip_prefix("lib:") else {
            return Resolution::Unclaimed;
        };
        let builder = self.entries.read().get(name).cloned();
        match builder {
            Some(builder) => Resolution::Claimed(builder(scheduler)),
            None => Resolution::Unclaimed,
        }
    }
}
