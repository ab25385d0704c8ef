//! Dotted-name Lookup
//!
//! Resolution of `a.b.c` against a [`Context`]. The first segment is searched frame by
//! frame through the context (nearest definition wins); every later segment is
//! resolved directly on the frame found for the previous one, never on the context.
//!
//! The walk is an explicit state machine over (context index, segment). A step that
//! hits a pending attribute parks the lookup; the attribute's listener deposits the
//! value and either lets the running step continue inline or resubmits the lookup, so
//! long dependency chains never grow the host stack.

use crate::context::Context;
use crate::error::{BlockedLookup, EvalError, LookupAttempt};
use crate::frame::{Definition, Presence, Scope};
use crate::future::{Future, Task};
use crate::scheduler::Scheduler;
use crate::source::SourceRef;
use crate::types::{verify_symbol, FrameId};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// Split `a.b.c` into its segments.
pub fn parse_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

#[derive(Default)]
struct Progress {
    frames: Option<Vec<FrameId>>,
    context_index: usize,
    segment: usize,
    current: Option<FrameId>,
    parked: Option<Value>,
    waiting: bool,
    running: bool,
    attempts: Vec<LookupAttempt>,
    blocked_on: Option<(FrameId, Arc<str>)>,
}

pub(crate) struct LookupCore {
    names: Vec<Arc<str>>,
    context: Context,
    location: SourceRef,
    progress: Mutex<Progress>,
}

impl LookupCore {
    pub(crate) fn path(&self) -> String {
        self.names
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn deliver(&self, value: Value, this: &Future) {
        let mut progress = self.progress.lock();
        progress.parked = Some(value);
        progress.waiting = false;
        progress.blocked_on = None;
        let inline = progress.running;
        drop(progress);
        if !inline {
            this.submit();
        }
    }

    /// Describe what this lookup is stuck on.
    pub(crate) fn blocked(&self, scheduler: &Scheduler) -> BlockedLookup {
        let blocked_on = self.progress.lock().blocked_on.clone();
        let (frame, attribute, frame_location) = match blocked_on {
            Some((frame, attribute)) => (
                Some(frame),
                Some(attribute.to_string()),
                scheduler.frame(frame).map(|f| f.source().clone()),
            ),
            None => (None, None, None),
        };
        BlockedLookup {
            path: self.path(),
            location: self.location.clone(),
            frame,
            attribute,
            frame_location,
        }
    }

    fn not_found(&self, progress: &Progress) -> EvalError {
        EvalError::NameNotFound {
            path: self.path(),
            attempts: progress.attempts.clone(),
            location: self.location.clone(),
        }
    }
}

pub(crate) struct LookupTask {
    core: Arc<LookupCore>,
}

impl LookupTask {
    pub(crate) fn new(core: Arc<LookupCore>) -> Self {
        LookupTask { core }
    }
}

enum Step {
    Finish(Value),
    Fail(EvalError),
    Suspend,
    Ask {
        frame: FrameId,
        context_index: usize,
        segment: usize,
    },
}

impl Task for LookupTask {
    fn run(&mut self, future: &Future) {
        let core = &self.core;
        let scheduler = future.scheduler();
        {
            let mut progress = core.progress.lock();
            progress.running = true;
            if progress.frames.is_none() {
                progress.frames = Some(core.context.frames().collect());
            }
        }
        loop {
            let step = {
                let mut progress = core.progress.lock();
                next_step(core, &mut progress)
            };
            let (frame_id, context_index, segment) = match step {
                Step::Finish(value) => {
                    future.complete(value);
                    return;
                }
                Step::Fail(error) => {
                    future.fail(error);
                    return;
                }
                Step::Suspend => return,
                Step::Ask {
                    frame,
                    context_index,
                    segment,
                } => (frame, context_index, segment),
            };

            let frame = match scheduler.frame(frame_id) {
                Some(frame) => frame,
                None => {
                    core.progress.lock().running = false;
                    future.fail(EvalError::evaluation(
                        &core.location,
                        format!("Frame {} is no longer available.", frame_id),
                    ));
                    return;
                }
            };
            let name = core.names[segment].clone();
            {
                let mut progress = core.progress.lock();
                progress.attempts.push(LookupAttempt {
                    context_index,
                    segment,
                    frame: frame_id,
                    frame_location: frame.source().clone(),
                });
                progress.waiting = true;
                progress.blocked_on = Some((frame_id, name.clone()));
            }

            let deliver_core = core.clone();
            let this = future.clone();
            let presence =
                frame.get_or_activate(&name, move |value| deliver_core.deliver(value, &this));
            match presence {
                Presence::Ready => {}
                Presence::Pending(dependency) => future.depends_on(&dependency),
                Presence::Absent => {
                    let mut progress = core.progress.lock();
                    progress.waiting = false;
                    progress.blocked_on = None;
                    if segment == 0 {
                        progress.context_index += 1;
                    } else {
                        progress.running = false;
                        let error = core.not_found(&progress);
                        drop(progress);
                        future.fail(error);
                        return;
                    }
                }
            }
        }
    }
}

/// Decide what to do next. Clears `running` whenever the walk stops.
fn next_step(core: &LookupCore, progress: &mut Progress) -> Step {
    if let Some(value) = progress.parked.take() {
        if progress.segment + 1 == core.names.len() {
            progress.running = false;
            return Step::Finish(value);
        }
        match value {
            Value::Frame(id) => {
                progress.segment += 1;
                progress.current = Some(id);
            }
            other => {
                progress.running = false;
                return Step::Fail(EvalError::NonFramePathSegment {
                    path: core.path(),
                    segment: core.names[progress.segment].to_string(),
                    found: other.kind(),
                    location: core.location.clone(),
                });
            }
        }
    } else if progress.waiting {
        progress.running = false;
        return Step::Suspend;
    }

    let frame = if progress.segment == 0 {
        let found = progress
            .frames
            .as_ref()
            .and_then(|frames| frames.get(progress.context_index).copied());
        match found {
            Some(frame) => frame,
            None => {
                progress.running = false;
                return Step::Fail(core.not_found(progress));
            }
        }
    } else {
        match progress.current {
            Some(frame) => frame,
            None => {
                progress.running = false;
                return Step::Fail(core.not_found(progress));
            }
        }
    };
    Step::Ask {
        frame,
        context_index: progress.context_index,
        segment: progress.segment,
    }
}

/// Entry points for starting lookups.
pub struct Lookup;

impl Lookup {
    /// Create (but do not submit) a lookup of `names` in `context`.
    ///
    /// The returned future resolves to the value found, or never completes after
    /// reporting an error.
    pub fn create(
        scheduler: &Scheduler,
        location: &SourceRef,
        context: &Context,
        names: &[&str],
    ) -> Future {
        let core = Arc::new(LookupCore {
            names: names.iter().map(|n| Arc::from(*n)).collect(),
            context: context.clone(),
            location: location.clone(),
            progress: Mutex::new(Progress::default()),
        });
        if names.is_empty() {
            let future = Future::lookup(scheduler, core);
            future.fail(EvalError::evaluation(location, "Missing names in lookup."));
            return future;
        }
        Future::lookup(scheduler, core)
    }

    /// Create a lookup and submit it.
    pub fn start(
        scheduler: &Scheduler,
        location: &SourceRef,
        context: &Context,
        names: &[&str],
    ) -> Future {
        let future = Self::create(scheduler, location, context, names);
        future.activate();
        future
    }
}

impl Definition {
    /// An attribute whose value is the lookup of `names` in the defining scope.
    ///
    /// Malformed names are reported when the definition is invoked and yield a unit
    /// that never completes.
    pub fn lookup(names: &[&str]) -> Definition {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Definition::new(move |scheduler: &Scheduler, scope: &Scope| {
            if names.is_empty() {
                let future = Future::promise(scheduler);
                future.fail(EvalError::evaluation(&scope.source, "Missing names in lookup."));
                return future;
            }
            for name in &names {
                if let Err(message) = verify_symbol(name) {
                    let future = Future::promise(scheduler);
                    future.fail(EvalError::InvalidName {
                        message,
                        location: scope.source.clone(),
                    });
                    return future;
                }
            }
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            Lookup::create(scheduler, &scope.source, &scope.context, &refs)
        })
    }
}
