//! Conversion of language values into native types for interlock requirements.

use crate::frame::template::Template;
use crate::types::FrameId;
use crate::value::{Value, ValueKind};
use std::sync::Arc;

/// A native type an interlock requirement can be filled with.
pub trait Marshal: Sized + Send + 'static {
    /// Kinds accepted, as listed in type mismatch reports.
    fn expected() -> Vec<ValueKind>;

    fn marshal(value: &Value) -> Option<Self>;
}

/// Accepts strings, and renders booleans and numbers as text.
impl Marshal for String {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Str]
    }

    fn marshal(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s.to_string()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => value.render_scalar(),
            _ => None,
        }
    }
}

/// Integers widen to floats.
impl Marshal for f64 {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Float, ValueKind::Int]
    }

    fn marshal(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl Marshal for i64 {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Int]
    }

    fn marshal(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Marshal for bool {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Bool]
    }

    fn marshal(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Marshal for Arc<[u8]> {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Bin]
    }

    fn marshal(value: &Value) -> Option<Self> {
        match value {
            Value::Bin(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }
}

impl Marshal for FrameId {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Frame]
    }

    fn marshal(value: &Value) -> Option<Self> {
        value.as_frame()
    }
}

impl Marshal for Arc<Template> {
    fn expected() -> Vec<ValueKind> {
        vec![ValueKind::Template]
    }

    fn marshal(value: &Value) -> Option<Self> {
        match value {
            Value::Template(template) => Some(template.clone()),
            _ => None,
        }
    }
}

/// Any value, unconverted.
impl Marshal for Value {
    fn expected() -> Vec<ValueKind> {
        vec![
            ValueKind::Null,
            ValueKind::Bool,
            ValueKind::Int,
            ValueKind::Float,
            ValueKind::Str,
            ValueKind::Bin,
            ValueKind::Frame,
            ValueKind::Template,
        ]
    }

    fn marshal(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}
