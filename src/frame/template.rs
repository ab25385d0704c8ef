//! Templates
//!
//! A template is a reusable set of attribute definitions together with the context it
//! was written in. Instantiating one at a call site builds a new frame whose context
//! walks the new frame, then the call site's scopes, then the template's own scopes.

use super::{Attribute, Definition, Frame, Scope};
use crate::context::Context;
use crate::error::EngineError;
use crate::future::Future;
use crate::interlock::{Adapter, DefaultPolicy, Interlock, Interlocked, Slot};
use crate::scheduler::Scheduler;
use crate::source::SourceRef;
use crate::types::FrameId;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A reusable definition set.
pub struct Template {
    source: SourceRef,
    context: Context,
    container: FrameId,
    definitions: BTreeMap<Arc<str>, Definition>,
}

impl Template {
    pub fn new(source: SourceRef, context: Context, container: FrameId) -> Self {
        Template {
            source,
            context,
            container,
            definitions: BTreeMap::new(),
        }
    }

    /// Add a definition. Names can never be redefined.
    pub fn set(&mut self, name: &str, definition: Definition) -> Result<(), EngineError> {
        if self.definitions.contains_key(name) {
            return Err(EngineError::Redefinition {
                frame: self.container,
                name: name.to_string(),
            });
        }
        self.definitions.insert(Arc::from(name), definition);
        Ok(())
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn container(&self) -> FrameId {
        self.container
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(|k| k.as_ref())
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source.message())
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

type Wrapper = Arc<dyn Fn(&Scheduler, &Scope, Future) -> Future + Send + Sync>;

/// How an instantiation changes one template attribute.
#[derive(Clone)]
pub enum Override {
    /// Use this definition instead.
    Replace(Definition),
    /// Wrap the template's own definition.
    Wrap { location: SourceRef, wrapper: Wrapper },
}

impl Override {
    pub fn wrap<F>(location: SourceRef, wrapper: F) -> Self
    where
        F: Fn(&Scheduler, &Scope, Future) -> Future + Send + Sync + 'static,
    {
        Override::Wrap {
            location,
            wrapper: Arc::new(wrapper),
        }
    }

    fn into_definition(self, template: &Template, name: &str) -> Definition {
        match self {
            Override::Replace(definition) => definition,
            Override::Wrap { location, wrapper } => Definition::override_of(
                location,
                template.get(name).cloned(),
                move |scheduler, scope, original| wrapper(scheduler, scope, original),
            ),
        }
    }
}

/// Instantiation of the template found at a path, with overrides.
pub struct Instantiation {
    template_path: Vec<String>,
    overrides: Vec<(String, Override)>,
    site: Context,
    location: SourceRef,
}

impl Instantiation {
    pub fn new(location: SourceRef, site: Context, template_path: &[&str]) -> Self {
        Instantiation {
            template_path: template_path.iter().map(|s| s.to_string()).collect(),
            overrides: Vec::new(),
            site,
            location,
        }
    }

    pub fn with_override(mut self, name: &str, change: Override) -> Self {
        self.overrides.push((name.to_string(), change));
        self
    }

    /// The unit producing the new frame.
    pub fn into_future(self, scheduler: &Scheduler) -> Future {
        let location = self.location.clone();
        let site = self.site.clone();
        Interlocked::new(location, site, self).into_future(scheduler)
    }

    fn build(&mut self, scheduler: &Scheduler, template: &Template) -> Result<Value, EngineError> {
        let joined = Context::append(&self.site, Some(template.context()));
        let source = SourceRef::junction(
            self.location.message(),
            self.location.file(),
            (0, 0),
            (0, 0),
            Some(self.location.clone()),
            template.source().clone(),
        );
        let frame = scheduler.create_frame(source, Some(&joined), true);
        for (name, change) in std::mem::take(&mut self.overrides) {
            let definition = change.into_definition(template, &name);
            frame.define(&name, Attribute::Lazy(definition))?;
        }
        for (name, definition) in &template.definitions {
            if !frame.has(name) {
                frame.define(name, Attribute::Lazy(definition.clone()))?;
            }
        }
        frame.close();
        debug!(frame = %frame.id(), attributes = frame.len(), "Instantiated template");
        Ok(Value::Frame(frame.id()))
    }
}

impl Adapter for Instantiation {
    type Inputs = Slot<Arc<Template>>;

    fn setup(&mut self, interlock: &mut Interlock) -> Self::Inputs {
        let path: Vec<&str> = self.template_path.iter().map(String::as_str).collect();
        interlock.require(DefaultPolicy::Required, &path)
    }

    fn resolve(&mut self, scheduler: &Scheduler, template: Self::Inputs) -> Result<Value, String> {
        let template = template
            .take()
            .ok_or_else(|| "Template did not arrive.".to_string())?;
        self.build(scheduler, &template).map_err(|e| e.to_string())
    }
}

impl Frame {
    /// Capture `definitions` as a template closing over this frame's context.
    pub fn template(
        &self,
        source: SourceRef,
        definitions: Vec<(&str, Definition)>,
    ) -> Result<Arc<Template>, EngineError> {
        let mut template = Template::new(source, self.context().clone(), self.id());
        for (name, definition) in definitions {
            template.set(name, definition)?;
        }
        Ok(Arc::new(template))
    }
}
