//! Single-assignment Futures
//!
//! A [`Future`] is both a memo cell and a schedulable unit of work. Its body (a
//! [`Task`]) is run by the scheduler; the body either completes the future or
//! registers listeners on other futures and returns, to be resubmitted later.
//!
//! Result assignment and listener registration share one mutex so that a future can
//! be completed from a thread outside the scheduling loop. The first transition out
//! of `Pending` wins; later attempts are no-ops.

use crate::error::EvalError;
use crate::lookup::LookupCore;
use crate::scheduler::Scheduler;
use crate::types::FutureId;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Callback receiving a future's value.
pub type Listener = Box<dyn FnOnce(Value) + Send>;

/// The body of a unit of work.
pub trait Task: Send + 'static {
    /// Called each time the unit is dequeued while its future is still pending.
    fn run(&mut self, future: &Future);
}

impl<F> Task for F
where
    F: FnMut(&Future) + Send + 'static,
{
    fn run(&mut self, future: &Future) {
        self(future)
    }
}

enum State {
    Pending {
        listeners: Vec<Listener>,
        activated: bool,
    },
    Ready(Value),
    Failed,
}

pub(crate) struct FutureInner {
    id: FutureId,
    scheduler: Scheduler,
    state: Mutex<State>,
    queued: AtomicBool,
    task: Mutex<Option<Box<dyn Task>>>,
    lookup: Option<Arc<LookupCore>>,
    waits: Mutex<Vec<(FutureId, Weak<FutureInner>)>>,
}

/// The far end of a wait edge.
pub(crate) enum Dependency {
    Live(Future),
    /// Freed; only its identity is left.
    Gone(FutureId),
}

/// A single-assignment result cell with listeners.
#[derive(Clone)]
pub struct Future {
    inner: Arc<FutureInner>,
}

impl Future {
    fn build(
        scheduler: &Scheduler,
        state: State,
        task: Option<Box<dyn Task>>,
        lookup: Option<Arc<LookupCore>>,
    ) -> Self {
        Future {
            inner: Arc::new(FutureInner {
                id: scheduler.next_future_id(),
                scheduler: scheduler.clone(),
                state: Mutex::new(state),
                queued: AtomicBool::new(false),
                task: Mutex::new(task),
                lookup,
                waits: Mutex::new(Vec::new()),
            }),
        }
    }

    fn pending() -> State {
        State::Pending {
            listeners: Vec::new(),
            activated: false,
        }
    }

    /// A unit whose body is `task`.
    pub fn new(scheduler: &Scheduler, task: impl Task) -> Self {
        Self::build(scheduler, Self::pending(), Some(Box::new(task)), None)
    }

    /// A future with no body; something else completes it.
    pub fn promise(scheduler: &Scheduler) -> Self {
        Self::build(scheduler, Self::pending(), None, None)
    }

    /// A future that already holds `value`.
    pub fn ready(scheduler: &Scheduler, value: Value) -> Self {
        Self::build(scheduler, State::Ready(value), None, None)
    }

    pub(crate) fn lookup(scheduler: &Scheduler, core: Arc<LookupCore>) -> Self {
        let task = crate::lookup::LookupTask::new(core.clone());
        Self::build(scheduler, Self::pending(), Some(Box::new(task)), Some(core))
    }

    pub fn id(&self) -> FutureId {
        self.inner.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn lookup_core(&self) -> Option<&Arc<LookupCore>> {
        self.inner.lookup.as_ref()
    }

    pub fn is_lookup(&self) -> bool {
        self.inner.lookup.is_some()
    }

    /// The result, if one has been published.
    pub fn value(&self) -> Option<Value> {
        match &*self.inner.state.lock() {
            State::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Pending { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Failed)
    }

    pub fn ptr_eq(&self, other: &Future) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `listener` with the result: now if it exists, otherwise on completion.
    ///
    /// Registering the first listener on a pending future submits it.
    pub fn listen(&self, listener: impl FnOnce(Value) + Send + 'static) {
        self.listen_inner(Box::new(listener), true);
    }

    /// Like [`Future::listen`] but never submits the future.
    pub fn listen_deferred(&self, listener: impl FnOnce(Value) + Send + 'static) {
        self.listen_inner(Box::new(listener), false);
    }

    fn listen_inner(&self, listener: Listener, submit: bool) {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Pending {
                listeners,
                activated,
            } => {
                listeners.push(listener);
                let first_activation = submit && !*activated;
                if first_activation {
                    *activated = true;
                }
                drop(state);
                if first_activation {
                    self.inner.scheduler.submit(self);
                }
            }
            State::Ready(value) => {
                let value = value.clone();
                drop(state);
                listener(value);
            }
            // A failed unit never delivers; dependents stay pending.
            State::Failed => {}
        }
    }

    /// Submit this future if it has never been submitted.
    pub fn activate(&self) {
        let mut state = self.inner.state.lock();
        if let State::Pending { activated, .. } = &mut *state {
            if !*activated {
                *activated = true;
                drop(state);
                self.inner.scheduler.submit(self);
            }
        }
    }

    /// Enqueue this unit to run again.
    pub fn submit(&self) {
        self.inner.scheduler.submit(self);
    }

    /// Publish `value`. Returns `false`, leaving the first result intact, if a
    /// result was already published.
    pub fn complete(&self, value: Value) -> bool {
        let listeners = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending { listeners, .. } => {
                    let listeners = std::mem::take(listeners);
                    *state = State::Ready(value.clone());
                    listeners
                }
                State::Ready(_) | State::Failed => {
                    warn!(unit = self.id().as_u64(), "Ignoring second completion of a unit");
                    return false;
                }
            }
        };
        self.inner.scheduler.retire(self);
        for listener in listeners {
            listener(value.clone());
        }
        true
    }

    /// Report `error` and mark this unit as permanently unfinished.
    ///
    /// Listeners are dropped without being called.
    pub fn fail(&self, error: EvalError) -> bool {
        let listeners = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Pending { listeners, .. } => {
                    let listeners = std::mem::take(listeners);
                    *state = State::Failed;
                    listeners
                }
                State::Ready(_) | State::Failed => return false,
            }
        };
        drop(listeners);
        self.inner.scheduler.record_failure(self.id());
        self.inner.scheduler.report(error);
        self.inner.scheduler.retire(self);
        true
    }

    /// Record that this unit is waiting on `dependency`. Used only for diagnosis.
    pub fn depends_on(&self, dependency: &Future) {
        if self.ptr_eq(dependency) {
            return;
        }
        self.inner
            .waits
            .lock()
            .push((dependency.id(), Arc::downgrade(&dependency.inner)));
    }

    pub(crate) fn dependencies(&self) -> Vec<Dependency> {
        self.inner
            .waits
            .lock()
            .iter()
            .map(|(id, edge)| match edge.upgrade() {
                Some(inner) => Dependency::Live(Future { inner }),
                None => Dependency::Gone(*id),
            })
            .collect()
    }

    /// Mark as queued; `false` if it already was.
    pub(crate) fn mark_queued(&self) -> bool {
        !self.inner.queued.swap(true, Ordering::AcqRel)
    }

    /// Run the body once. Called by the scheduler when the unit is dequeued.
    pub(crate) fn execute(&self) {
        self.inner.queued.store(false, Ordering::Release);
        if !self.is_pending() {
            return;
        }
        let task = self.inner.task.lock().take();
        let Some(mut task) = task else {
            return;
        };
        trace!(unit = self.id().as_u64(), "Running unit");
        task.run(self);
        if self.is_pending() {
            *self.inner.task.lock() = Some(task);
        }
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.lock() {
            State::Pending { .. } => "pending".to_string(),
            State::Ready(value) => format!("ready({:?})", value),
            State::Failed => "failed".to_string(),
        };
        f.debug_struct("Future")
            .field("id", &self.inner.id)
            .field("state", &state)
            .finish()
    }
}
