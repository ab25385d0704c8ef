//! Interlocks
//!
//! Fan-out/fan-in join for one consumer: the consumer registers typed requirements,
//! each backed by a lookup, and is resubmitted exactly once after every requirement has
//! arrived and been converted. A requirement that arrives with the wrong type fails
//! the consumer, so it is never released.

pub mod marshal;

pub use marshal::Marshal;

use crate::context::Context;
use crate::error::EvalError;
use crate::future::{Future, Task};
use crate::lookup::Lookup;
use crate::scheduler::Scheduler;
use crate::source::SourceRef;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What to do when a requirement resolves to null.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultPolicy<T> {
    /// Null is only accepted if the native type takes it.
    Required,
    /// Null leaves the slot empty.
    Optional,
    /// Null fills the slot with this value.
    Or(T),
}

/// Target of one requirement; filled before the consumer is released.
pub struct Slot<T>(Arc<Mutex<Option<T>>>);

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot(self.0.clone())
    }
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot(Arc::new(Mutex::new(None)))
    }

    pub fn take(&self) -> Option<T> {
        self.0.lock().take()
    }

    pub fn is_filled(&self) -> bool {
        self.0.lock().is_some()
    }
}

impl<T: Clone> Slot<T> {
    pub fn get(&self) -> Option<T> {
        self.0.lock().clone()
    }
}

/// Countdown join owned by one consumer unit.
pub struct Interlock {
    owner: Future,
    location: SourceRef,
    context: Context,
    countdown: Arc<AtomicUsize>,
}

fn release(countdown: &AtomicUsize, owner: &Future) {
    if countdown.fetch_sub(1, Ordering::AcqRel) == 1 {
        debug!(unit = owner.id().as_u64(), "Interlock released");
        owner.submit();
    }
}

impl Interlock {
    /// Start registering requirements for `owner`, resolved in `context`.
    pub fn new(owner: &Future, location: &SourceRef, context: &Context) -> Self {
        Interlock {
            owner: owner.clone(),
            location: location.clone(),
            context: context.clone(),
            countdown: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.owner.scheduler()
    }

    /// Require the value of `names` converted to `T`.
    pub fn require<T: Marshal>(&mut self, policy: DefaultPolicy<T>, names: &[&str]) -> Slot<T> {
        let lookup = Lookup::create(self.scheduler(), &self.location, &self.context, names);
        self.require_unit(policy, names.join("."), lookup)
    }

    /// Require the value of an arbitrary unit, such as an external resource.
    pub fn require_unit<T: Marshal>(
        &mut self,
        policy: DefaultPolicy<T>,
        path: impl Into<String>,
        unit: Future,
    ) -> Slot<T> {
        let slot = Slot::new();
        self.countdown.fetch_add(1, Ordering::AcqRel);
        self.owner.depends_on(&unit);

        let target = slot.clone();
        let countdown = self.countdown.clone();
        let owner = self.owner.clone();
        let location = self.location.clone();
        let path = path.into();
        unit.listen(move |value| {
            let filled = if value.is_null() {
                match policy {
                    DefaultPolicy::Optional => Some(None),
                    DefaultPolicy::Or(default) => Some(Some(default)),
                    DefaultPolicy::Required => T::marshal(&value).map(Some),
                }
            } else {
                T::marshal(&value).map(Some)
            };
            match filled {
                Some(filled) => {
                    *target.0.lock() = filled;
                    release(&countdown, &owner);
                }
                None => {
                    let error = EvalError::TypeMismatch {
                        path,
                        found: value.kind(),
                        expected: T::expected(),
                        location,
                    };
                    if !owner.fail(error.clone()) {
                        owner.scheduler().report(error);
                    }
                }
            }
        });
        slot
    }

    /// Finish registering. Returns `true` if every requirement had already arrived.
    pub fn seal(self) -> bool {
        let released = self.countdown.load(Ordering::Acquire) == 1;
        release(&self.countdown, &self.owner);
        released
    }
}

/// A native operation that gathers typed inputs, then computes one value.
pub trait Adapter: Send + 'static {
    type Inputs: Send + 'static;

    /// Register requirements; the returned inputs hold their slots.
    fn setup(&mut self, interlock: &mut Interlock) -> Self::Inputs;

    /// Produce the result once every slot is filled. An error message is reported at
    /// the adapter's location.
    fn resolve(&mut self, scheduler: &Scheduler, inputs: Self::Inputs) -> Result<Value, String>;
}

/// Task running an [`Adapter`] through an [`Interlock`].
pub struct Interlocked<A: Adapter> {
    adapter: A,
    location: SourceRef,
    context: Context,
    inputs: Option<A::Inputs>,
    started: bool,
}

impl<A: Adapter> Interlocked<A> {
    pub fn new(location: SourceRef, context: Context, adapter: A) -> Self {
        Interlocked {
            adapter,
            location,
            context,
            inputs: None,
            started: false,
        }
    }

    /// Wrap in a unit that runs when listened to or activated.
    pub fn into_future(self, scheduler: &Scheduler) -> Future {
        Future::new(scheduler, self)
    }
}

impl<A: Adapter> Task for Interlocked<A> {
    fn run(&mut self, future: &Future) {
        if !self.started {
            self.started = true;
            let mut interlock = Interlock::new(future, &self.location, &self.context);
            self.inputs = Some(self.adapter.setup(&mut interlock));
            interlock.seal();
            return;
        }
        let Some(inputs) = self.inputs.take() else {
            return;
        };
        match self.adapter.resolve(future.scheduler(), inputs) {
            Ok(value) => {
                future.complete(value);
            }
            Err(message) => {
                future.fail(EvalError::evaluation(&self.location, message));
            }
        }
    }
}
