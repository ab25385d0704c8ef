//! Shared test utilities for integration tests
//!
//! Engine setup helpers, plus serialized access to the environment variables the
//! configuration loader reads.

use frameval::lookup::{parse_path, Lookup};
use frameval::scheduler::report::CollectingSink;
use frameval::{Context, Future, Scheduler, SourceRef};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A scheduler reporting into a collecting sink.
pub fn engine() -> (Scheduler, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    (Scheduler::new(sink.clone()), sink)
}

/// Start a lookup of dotted `path` in `context`, without draining.
pub fn lookup(scheduler: &Scheduler, context: &Context, path: &str) -> Future {
    Lookup::start(
        scheduler,
        &SourceRef::native(format!("lookup of {}", path)),
        context,
        &parse_path(path),
    )
}

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const TOUCHED: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "FRAMEVAL_ENV",
    "FRAMEVAL__SCHEDULER__RESULT_PATH",
    "FRAMEVAL__SCHEDULER__DEADLOCK_REPORT_LIMIT",
];

/// Environment variable state to restore after test
struct EnvState(Vec<(&'static str, Option<String>)>);

impl EnvState {
    fn capture() -> Self {
        EnvState(
            TOUCHED
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        )
    }

    fn restore(self) {
        for (name, value) in self.0 {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with XDG_CONFIG_HOME and HOME pointing into `test_dir`.
///
/// Every variable the loader reads is restored afterwards.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_config_home = test_dir.path().join("xdg");
    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_config_home).unwrap();
    std::fs::create_dir_all(&test_home).unwrap();

    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", &test_config_home);
    for name in &TOUCHED[2..] {
        std::env::remove_var(name);
    }

    let result = f();

    env_state.restore();

    result
}
