//! Scheduler
//!
//! State for one evaluation run: the FIFO work queue, the frame arena, the set of
//! in-flight lookups, the external-resource cache and the identity generator. A
//! single consumer drains the queue; other threads may enqueue work and complete
//! futures while it does.
//!
//! When the queue is empty and no foreign work is outstanding, the remaining
//! in-flight lookups are examined. Lookups whose wait edges lead to a failed unit are
//! already explained by that failure; any others are reported as a deadlock.

pub mod external;
pub mod report;

use crate::config::SchedulerConfig;
use crate::context::Context;
use crate::error::{EvalError, ExternalFailure};
use crate::frame::Frame;
use crate::future::{Dependency, Future};
use crate::source::SourceRef;
use crate::types::{FrameId, FutureId};
use external::{ExternalResolver, Resolution};
use parking_lot::{Mutex, RwLock};
use report::ErrorSink;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Cached outcome of resolving an external resource name.
enum Cached {
    Resolved(Future),
    Failed {
        failure: ExternalFailure,
        unit: Future,
    },
}

struct Queue {
    units: VecDeque<Future>,
    foreign: Vec<oneshot::Receiver<()>>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    queue: Mutex<Queue>,
    next_id: AtomicU64,
    in_flight: Mutex<HashMap<FutureId, Future>>,
    failed: Mutex<HashSet<FutureId>>,
    frames: RwLock<Vec<Arc<Frame>>>,
    externals: Mutex<HashMap<String, Cached>>,
    resolvers: RwLock<Vec<Arc<dyn ExternalResolver>>>,
    sink: Arc<dyn ErrorSink>,
    errors: AtomicUsize,
    deadlocked: AtomicBool,
}

/// Summary of one drain of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drain {
    pub executed: usize,
    pub deadlock: bool,
}

/// Handle to the run state. Cloning shares it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self::with_config(SchedulerConfig::default(), sink)
    }

    pub fn with_config(config: SchedulerConfig, sink: Arc<dyn ErrorSink>) -> Self {
        Scheduler {
            inner: Arc::new(SchedulerInner {
                config,
                queue: Mutex::new(Queue {
                    units: VecDeque::new(),
                    foreign: Vec::new(),
                }),
                next_id: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
                failed: Mutex::new(HashSet::new()),
                frames: RwLock::new(Vec::new()),
                externals: Mutex::new(HashMap::new()),
                resolvers: RwLock::new(Vec::new()),
                sink,
                errors: AtomicUsize::new(0),
                deadlocked: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub(crate) fn next_future_id(&self) -> FutureId {
        FutureId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a frame in the arena.
    pub fn create_frame(
        &self,
        source: SourceRef,
        context: Option<&Context>,
        self_is_this: bool,
    ) -> Arc<Frame> {
        let mut frames = self.inner.frames.write();
        let id = FrameId(frames.len() as u32);
        let frame = Frame::build(self, id, source, context, self_is_this);
        frames.push(frame.clone());
        frame
    }

    pub fn frame(&self, id: FrameId) -> Option<Arc<Frame>> {
        self.inner.frames.read().get(id.index()).cloned()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.frames.read().len()
    }

    /// Enqueue `unit` unless it is already queued.
    pub fn submit(&self, unit: &Future) {
        if !unit.is_pending() || !unit.mark_queued() {
            return;
        }
        if unit.is_lookup() {
            self.inner.in_flight.lock().insert(unit.id(), unit.clone());
        }
        self.inner.queue.lock().units.push_back(unit.clone());
    }

    /// Forget a unit that has finished.
    pub(crate) fn retire(&self, unit: &Future) {
        if unit.is_lookup() {
            self.inner.in_flight.lock().remove(&unit.id());
        }
    }

    /// Remember that `unit` failed, so waits on it stay explained after it is freed.
    pub(crate) fn record_failure(&self, unit: FutureId) {
        self.inner.failed.lock().insert(unit);
    }

    /// Report a language-level error through the sink.
    pub fn report(&self, error: EvalError) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
        warn!(kind = ?error.kind(), "{}", error);
        self.inner.sink.report(&error);
    }

    pub fn error_count(&self) -> usize {
        self.inner.errors.load(Ordering::Relaxed)
    }

    pub fn deadlocked(&self) -> bool {
        self.inner.deadlocked.load(Ordering::Relaxed)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Announce work that will complete a future from another thread.
    ///
    /// Until the guard is dropped, an empty queue makes the drain loop wait rather
    /// than stop. Complete the future before dropping the guard.
    pub fn foreign_work(&self) -> ForeignWork {
        let (done, pending) = oneshot::channel();
        self.inner.queue.lock().foreign.push(pending);
        ForeignWork { done: Some(done) }
    }

    /// Run queued units until none are left, then check for deadlock.
    pub fn run_to_completion(&self) -> Drain {
        let mut drain = Drain::default();
        loop {
            let next = {
                let mut queue = self.inner.queue.lock();
                match queue.units.pop_front() {
                    Some(unit) => Next::Run(unit),
                    None => match queue.foreign.pop() {
                        Some(pending) => Next::Wait(pending),
                        None => Next::Done,
                    },
                }
            };
            match next {
                Next::Run(unit) => {
                    drain.executed += 1;
                    unit.execute();
                }
                // Sent or dropped, either way the foreign side is finished.
                Next::Wait(pending) => {
                    let _ = pending.blocking_recv();
                }
                Next::Done => break,
            }
        }
        drain.deadlock = self.detect_deadlock();
        debug!(executed = drain.executed, deadlock = drain.deadlock, "Queue drained");
        drain
    }

    fn detect_deadlock(&self) -> bool {
        let mut stuck: Vec<Future> = self
            .inner
            .in_flight
            .lock()
            .values()
            .filter(|unit| unit.is_pending())
            .cloned()
            .collect();
        if stuck.is_empty() {
            return false;
        }
        stuck.sort_by_key(Future::id);
        {
            // A lookup resubmitted later re-enters the set.
            let mut in_flight = self.inner.in_flight.lock();
            for unit in &stuck {
                in_flight.remove(&unit.id());
            }
        }
        let unexplained: Vec<Future> = stuck
            .into_iter()
            .filter(|unit| !self.reaches_failure(unit))
            .collect();
        if unexplained.is_empty() {
            return false;
        }

        let limit = self.inner.config.deadlock_report_limit;
        let blocked: Vec<_> = unexplained
            .iter()
            .take(limit)
            .filter_map(|unit| unit.lookup_core().map(|core| core.blocked(self)))
            .collect();
        let omitted = unexplained.len().saturating_sub(blocked.len());
        error!(
            blocked = unexplained.len(),
            "Evaluation deadlocked with lookups still waiting"
        );
        self.inner.deadlocked.store(true, Ordering::Relaxed);
        self.report(EvalError::Deadlock { blocked, omitted });
        true
    }

    pub fn add_resolver(&self, resolver: Arc<dyn ExternalResolver>) {
        self.inner.resolvers.write().push(resolver);
    }

    /// The unit producing the external resource `uri`.
    ///
    /// Results are cached per name. A name that no resolver can provide is reported
    /// once; later requests get the same never-completing unit.
    pub fn resolve_external(&self, uri: &str) -> Future {
        if let Some(cached) = self.inner.externals.lock().get(uri) {
            return match cached {
                Cached::Resolved(unit) => unit.clone(),
                Cached::Failed { unit, .. } => unit.clone(),
            };
        }

        let outcome = if uri.starts_with("lib:") && !valid_library_name(&uri[4..]) {
            Err(ExternalFailure::BadName)
        } else {
            let resolvers: Vec<_> = self.inner.resolvers.read().clone();
            let mut outcome = Err(ExternalFailure::Missing);
            for resolver in resolvers {
                match resolver.resolve(self, uri) {
                    Resolution::Unclaimed => continue,
                    Resolution::Claimed(unit) => {
                        outcome = Ok(unit);
                        break;
                    }
                    Resolution::Failed(failure) => {
                        outcome = Err(failure);
                        break;
                    }
                }
            }
            outcome
        };

        let mut externals = self.inner.externals.lock();
        if let Some(existing) = externals.get(uri) {
            return match existing {
                Cached::Resolved(unit) | Cached::Failed { unit, .. } => unit.clone(),
            };
        }
        match outcome {
            Ok(unit) => {
                debug!(uri, "Resolved external resource");
                externals.insert(uri.to_string(), Cached::Resolved(unit.clone()));
                unit
            }
            Err(failure) => {
                let unit = Future::promise(self);
                externals.insert(
                    uri.to_string(),
                    Cached::Failed {
                        failure,
                        unit: unit.clone(),
                    },
                );
                drop(externals);
                unit.fail(EvalError::ExternalResource {
                    uri: uri.to_string(),
                    failure,
                });
                unit
            }
        }
    }

    /// The cached failure for `uri`, if resolving it failed.
    pub fn external_failure(&self, uri: &str) -> Option<ExternalFailure> {
        match self.inner.externals.lock().get(uri) {
            Some(Cached::Failed { failure, .. }) => Some(*failure),
            _ => None,
        }
    }

    /// Drop all run state so that frames, futures and this scheduler can be freed.
    pub fn shutdown(&self) {
        let units = std::mem::take(&mut self.inner.queue.lock().units);
        let in_flight = std::mem::take(&mut *self.inner.in_flight.lock());
        let frames = std::mem::take(&mut *self.inner.frames.write());
        let externals = std::mem::take(&mut *self.inner.externals.lock());
        let resolvers = std::mem::take(&mut *self.inner.resolvers.write());
        self.inner.failed.lock().clear();
        info!(
            frames = frames.len(),
            errors = self.error_count(),
            "Scheduler shut down"
        );
        drop((units, in_flight, frames, externals, resolvers));
    }

    /// Whether a failed unit is reachable from `unit` through wait edges.
    fn reaches_failure(&self, unit: &Future) -> bool {
        let failed = self.inner.failed.lock();
        let mut seen = HashSet::new();
        let mut stack = vec![unit.clone()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.id()) {
                continue;
            }
            if current.is_failed() {
                return true;
            }
            for dependency in current.dependencies() {
                match dependency {
                    Dependency::Live(next) => stack.push(next),
                    Dependency::Gone(id) if failed.contains(&id) => return true,
                    Dependency::Gone(_) => {}
                }
            }
        }
        false
    }
}

enum Next {
    Run(Future),
    Wait(oneshot::Receiver<()>),
    Done,
}

/// `lib:` names are letters, digits and `/`.
fn valid_library_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '/')
}

/// Outstanding foreign completion; see [`Scheduler::foreign_work`].
pub struct ForeignWork {
    done: Option<oneshot::Sender<()>>,
}

impl Drop for ForeignWork {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}
