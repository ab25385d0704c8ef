//! Runtime values of the language.

use crate::frame::template::Template;
use crate::types::FrameId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A fully evaluated value.
///
/// Cloning is cheap: strings, blobs and templates are shared, frames are arena handles.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bin(Arc<[u8]>),
    Frame(FrameId),
    Template(Arc<Template>),
}

/// Runtime type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Bin,
    Frame,
    Template,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "Null",
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int",
            ValueKind::Float => "Float",
            ValueKind::Str => "Str",
            ValueKind::Bin => "Bin",
            ValueKind::Frame => "Frame",
            ValueKind::Template => "Template",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bin(_) => ValueKind::Bin,
            Value::Frame(_) => ValueKind::Frame,
            Value::Template(_) => ValueKind::Template,
        }
    }

    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_frame(&self) -> Option<FrameId> {
        match self {
            Value::Frame(id) => Some(*id),
            _ => None,
        }
    }

    /// Textual form of scalar values; `None` for frames, templates and blobs.
    pub fn render_scalar(&self) -> Option<String> {
        match self {
            Value::Null => Some("Null".to_string()),
            Value::Bool(true) => Some("True".to_string()),
            Value::Bool(false) => Some("False".to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(x) => Some(x.to_string()),
            Value::Str(s) => Some(s.to_string()),
            Value::Bin(_) | Value::Frame(_) | Value::Template(_) => None,
        }
    }

    /// JSON form of scalar values, used for machine-readable run output.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Int(i) => Some(serde_json::Value::from(*i)),
            Value::Float(x) => serde_json::Number::from_f64(*x).map(serde_json::Value::Number),
            Value::Str(s) => Some(serde_json::Value::String(s.to_string())),
            Value::Bin(_) | Value::Frame(_) | Value::Template(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bin(a), Value::Bin(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<FrameId> for Value {
    fn from(id: FrameId) -> Self {
        Value::Frame(id)
    }
}

impl From<Arc<Template>> for Value {
    fn from(t: Arc<Template>) -> Self {
        Value::Template(t)
    }
}
