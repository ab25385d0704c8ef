//! Frames
//!
//! Named, append-only attribute containers. A frame is filled while its literal or
//! instantiation is being built; lazy attributes are held back in a deferred list until
//! the frame is closed, then released to the scheduler. After that an attribute only
//! ever moves from pending to realized.

pub mod template;

use crate::context::Context;
use crate::error::{EngineError, EvalError};
use crate::future::Future;
use crate::scheduler::Scheduler;
use crate::source::SourceRef;
use crate::types::{ordinal_name, FrameId};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Where a lazy attribute is evaluated.
#[derive(Debug, Clone)]
pub struct Scope {
    pub source: SourceRef,
    pub context: Context,
    pub this: FrameId,
    pub container: FrameId,
}

type DefinitionFn = dyn Fn(&Scheduler, &Scope) -> Future + Send + Sync;

/// A lazy attribute body: given a scope, produce the unit computing the value.
#[derive(Clone)]
pub struct Definition(Arc<DefinitionFn>);

impl Definition {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&Scheduler, &Scope) -> Future + Send + Sync + 'static,
    {
        Definition(Arc::new(body))
    }

    /// A unit that completes with `value` once it is run.
    pub fn constant(value: Value) -> Self {
        Definition::new(move |scheduler, _scope| {
            let value = value.clone();
            Future::new(scheduler, move |this: &Future| {
                this.complete(value.clone());
            })
        })
    }

    /// A unit that reports `message` at the defining scope and never completes.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Definition::new(move |scheduler, scope| {
            let message = message.clone();
            let location = scope.source.clone();
            Future::new(scheduler, move |this: &Future| {
                this.fail(EvalError::evaluation(&location, message.clone()));
            })
        })
    }

    /// Replace `original`, handing its (unsubmitted) unit to `wrapper`.
    ///
    /// Overriding an attribute that does not exist reports an error when invoked.
    pub fn override_of<F>(location: SourceRef, original: Option<Definition>, wrapper: F) -> Self
    where
        F: Fn(&Scheduler, &Scope, Future) -> Future + Send + Sync + 'static,
    {
        Definition::new(move |scheduler, scope| match &original {
            Some(original) => {
                let inner = original.invoke(scheduler, scope);
                wrapper(scheduler, scope, inner)
            }
            None => {
                let future = Future::promise(scheduler);
                future.fail(EvalError::evaluation(
                    &location,
                    "Override of non-existent attribute.",
                ));
                future
            }
        })
    }

    pub fn invoke(&self, scheduler: &Scheduler, scope: &Scope) -> Future {
        (self.0)(scheduler, scope)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Definition(..)")
    }
}

/// What to store under a name.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Nothing: the name is skipped.
    Absent,
    Value(Value),
    Lazy(Definition),
}

/// Result of asking a frame for an attribute.
#[derive(Debug)]
pub enum Presence {
    Absent,
    /// The value was handed to the consumer synchronously.
    Ready,
    /// The consumer was attached to this pending unit.
    Pending(Future),
}

enum Slot {
    Pending(Future),
    Ready(Value),
}

/// Deferred units shared between a frame and the frames nested into it.
struct Deferred {
    owner: FrameId,
    pending: Vec<Future>,
    closed: bool,
}

type DeferredHandle = Arc<Mutex<Deferred>>;

/// A named attribute container.
pub struct Frame {
    id: FrameId,
    name: String,
    source: SourceRef,
    context: Context,
    container: FrameId,
    attributes: Mutex<BTreeMap<Arc<str>, Slot>>,
    deferred: Mutex<DeferredHandle>,
    me: Weak<Frame>,
    scheduler: Scheduler,
}

impl Frame {
    pub(crate) fn build(
        scheduler: &Scheduler,
        id: FrameId,
        source: SourceRef,
        context: Option<&Context>,
        self_is_this: bool,
    ) -> Arc<Frame> {
        let container = context.and_then(Context::this).unwrap_or(id);
        let context = if self_is_this {
            Context::prepend(id, context)
        } else {
            Context::prepend_binding(id, context)
        };
        let ordinal = scheduler.next_future_id().as_u64() as i64;
        Arc::new_cyclic(|me| Frame {
            id,
            name: ordinal_name(ordinal),
            source,
            context,
            container,
            attributes: Mutex::new(BTreeMap::new()),
            deferred: Mutex::new(Arc::new(Mutex::new(Deferred {
                owner: id,
                pending: Vec::new(),
                closed: false,
            }))),
            me: me.clone(),
            scheduler: scheduler.clone(),
        })
    }

    /// Build a frame from parallel name and attribute lists.
    ///
    /// The frame is not closed; the caller does that once construction is finished.
    pub fn create(
        scheduler: &Scheduler,
        source: SourceRef,
        context: Option<&Context>,
        self_is_this: bool,
        names: &[&str],
        attributes: Vec<Attribute>,
    ) -> Result<Arc<Frame>, EngineError> {
        if names.len() != attributes.len() {
            return Err(EngineError::AttributeCount {
                names: names.len(),
                definitions: attributes.len(),
            });
        }
        let frame = scheduler.create_frame(source, context, self_is_this);
        for (name, attribute) in names.iter().zip(attributes) {
            frame.define(name, attribute)?;
        }
        Ok(frame)
    }

    /// A frame holding the integers `start..=end` under ordinal names `1..`.
    pub fn through(
        scheduler: &Scheduler,
        source: SourceRef,
        context: Option<&Context>,
        start: i64,
        end: i64,
    ) -> Arc<Frame> {
        let frame = scheduler.create_frame(source, context, true);
        if end >= start {
            let mut attributes = frame.attributes.lock();
            for (index, value) in (start..=end).enumerate() {
                attributes.insert(
                    Arc::from(ordinal_name(index as i64 + 1)),
                    Slot::Ready(Value::Int(value)),
                );
            }
        }
        frame
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Sortable identity string.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    /// This frame's context, with the frame itself at the front.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn container(&self) -> FrameId {
        self.container
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scope(&self) -> Scope {
        Scope {
            source: self.source.clone(),
            context: self.context.clone(),
            this: self.id,
            container: self.container,
        }
    }

    fn redefinition(&self, name: &str) -> EngineError {
        EngineError::Redefinition {
            frame: self.id,
            name: name.to_string(),
        }
    }

    /// Give `name` a value or a lazy definition. Names can never be redefined.
    pub fn define(&self, name: &str, attribute: Attribute) -> Result<(), EngineError> {
        match attribute {
            Attribute::Absent => Ok(()),
            Attribute::Value(value) => {
                {
                    let mut attributes = self.attributes.lock();
                    if attributes.contains_key(name) {
                        return Err(self.redefinition(name));
                    }
                    attributes.insert(Arc::from(name), Slot::Ready(value.clone()));
                }
                self.adopt(&value);
                Ok(())
            }
            Attribute::Lazy(definition) => {
                if self.attributes.lock().contains_key(name) {
                    return Err(self.redefinition(name));
                }
                let scope = Scope {
                    source: self.source.child(format!("attribute “{}”", name)),
                    ..self.scope()
                };
                // The definition may look back into this frame, so no lock is held here.
                let future = definition.invoke(&self.scheduler, &scope);
                let key: Arc<str> = Arc::from(name);
                {
                    let mut attributes = self.attributes.lock();
                    if attributes.contains_key(name) {
                        return Err(self.redefinition(name));
                    }
                    attributes.insert(key.clone(), Slot::Pending(future.clone()));
                }
                let me = self.me.clone();
                future.listen_deferred(move |value| {
                    if let Some(frame) = me.upgrade() {
                        frame.realize(&key, value);
                    }
                });
                if future.is_pending() {
                    self.defer(future);
                }
                Ok(())
            }
        }
    }

    fn realize(&self, name: &str, value: Value) {
        let mut attributes = self.attributes.lock();
        if let Some(slot) = attributes.get_mut(name) {
            if matches!(slot, Slot::Pending(_)) {
                *slot = Slot::Ready(value);
            }
        }
    }

    fn defer(&self, future: Future) {
        let handle = self.deferred.lock().clone();
        let mut deferred = handle.lock();
        if deferred.closed {
            drop(deferred);
            future.activate();
        } else {
            deferred.pending.push(future);
        }
    }

    /// Take over the deferred units of a nested frame stored in this one.
    fn adopt(&self, value: &Value) {
        let Value::Frame(nested_id) = value else {
            return;
        };
        if *nested_id == self.id {
            return;
        }
        let Some(nested) = self.scheduler.frame(*nested_id) else {
            return;
        };
        let ours = self.deferred.lock().clone();
        let theirs = {
            let mut slot = nested.deferred.lock();
            if Arc::ptr_eq(&slot, &ours) {
                return;
            }
            std::mem::replace(&mut *slot, ours.clone())
        };
        let moved = std::mem::take(&mut theirs.lock().pending);
        if moved.is_empty() {
            return;
        }
        trace!(
            from = %nested_id,
            into = %self.id,
            count = moved.len(),
            "Transferring deferred attributes"
        );
        let mut deferred = ours.lock();
        if deferred.closed {
            drop(deferred);
            for future in moved {
                future.activate();
            }
        } else {
            deferred.pending.extend(moved);
        }
    }

    fn activate_deferred(&self) {
        let handle = self.deferred.lock().clone();
        let pending = std::mem::take(&mut handle.lock().pending);
        for future in pending {
            future.activate();
        }
    }

    /// Release every deferred unit to the scheduler.
    ///
    /// Does nothing for a frame whose deferred units were taken over by a container;
    /// the container releases them when it closes.
    pub fn close(&self) {
        let handle = self.deferred.lock().clone();
        let pending = {
            let mut deferred = handle.lock();
            if deferred.owner != self.id {
                return;
            }
            deferred.closed = true;
            std::mem::take(&mut deferred.pending)
        };
        for future in pending {
            future.activate();
        }
    }

    /// Hand `name` to `consumer`, now or once it is computed.
    pub fn get_or_activate<F>(&self, name: &str, consumer: F) -> Presence
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.activate_deferred();
        let found = match self.attributes.lock().get(name) {
            None => None,
            Some(Slot::Ready(value)) => Some(Ok(value.clone())),
            Some(Slot::Pending(future)) => Some(Err(future.clone())),
        };
        match found {
            None => Presence::Absent,
            Some(Ok(value)) => {
                consumer(value);
                Presence::Ready
            }
            Some(Err(future)) => {
                future.listen(consumer);
                Presence::Pending(future)
            }
        }
    }

    /// The realized value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.attributes.lock().get(name) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.attributes.lock().contains_key(name)
    }

    /// Attribute names in lexical order.
    pub fn names(&self) -> Vec<String> {
        self.attributes.lock().keys().map(|k| k.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.attributes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.lock().is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("attributes", &self.names())
            .finish()
    }
}
