//! Error types for the evaluation engine.
//!
//! Two families: [`EngineError`] is returned to host code for programming defects and
//! setup problems; [`EvalError`] describes a language-level failure and is only ever
//! reported through the scheduler's sink, never unwound.

use crate::source::SourceRef;
use crate::types::FrameId;
use crate::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Host-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Redefinition of attribute {name} in frame {frame}")]
    Redefinition { frame: FrameId, name: String },

    #[error("Got {names} attribute names but {definitions} definitions")]
    AttributeCount { names: usize, definitions: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

/// Why an external resource could not be provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalFailure {
    BadName,
    Missing,
    Corrupt,
}

impl fmt::Display for ExternalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalFailure::BadName => f.write_str("is not a valid name"),
            ExternalFailure::Missing => f.write_str("could not be found"),
            ExternalFailure::Corrupt => f.write_str("could not be loaded"),
        }
    }
}

/// One cell of a lookup's search grid: which frame was asked for which segment.
#[derive(Debug, Clone)]
pub struct LookupAttempt {
    pub context_index: usize,
    pub segment: usize,
    pub frame: FrameId,
    pub frame_location: SourceRef,
}

/// An in-flight lookup left unresolved when the queue drained.
#[derive(Debug, Clone)]
pub struct BlockedLookup {
    pub path: String,
    pub location: SourceRef,
    pub frame: Option<FrameId>,
    pub attribute: Option<String>,
    pub frame_location: Option<SourceRef>,
}

impl fmt::Display for BlockedLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.frame, &self.attribute) {
            (Some(frame), Some(attribute)) => write!(
                f,
                "lookup of “{}” is waiting on “{}” in frame {}",
                self.path, attribute, frame
            ),
            _ => write!(f, "lookup of “{}” has not started", self.path),
        }
    }
}

/// Stable tag for each language-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NameNotFound,
    NonFramePathSegment,
    TypeMismatch,
    ExternalResource,
    Deadlock,
    Evaluation,
    InvalidName,
}

/// Language-level errors
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("Undefined name “{path}”. Lookup was as follows:")]
    NameNotFound {
        path: String,
        attempts: Vec<LookupAttempt>,
        location: SourceRef,
    },

    #[error("Non-frame type {found} while resolving name “{path}” at “{segment}”.")]
    NonFramePathSegment {
        path: String,
        segment: String,
        found: ValueKind,
        location: SourceRef,
    },

    #[error("“{path}” has type {found} but expected {}.", join_kinds(.expected))]
    TypeMismatch {
        path: String,
        found: ValueKind,
        expected: Vec<ValueKind>,
        location: SourceRef,
    },

    #[error("The URI “{uri}” {failure}.")]
    ExternalResource { uri: String, failure: ExternalFailure },

    #[error("Circular evaluation detected: {} lookup(s) can never complete.", blocked_total(.blocked, .omitted))]
    Deadlock {
        blocked: Vec<BlockedLookup>,
        omitted: usize,
    },

    #[error("{message}")]
    Evaluation { message: String, location: SourceRef },

    #[error("{message}")]
    InvalidName { message: String, location: SourceRef },
}

fn join_kinds(kinds: &[ValueKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

fn blocked_total(blocked: &[BlockedLookup], omitted: &usize) -> usize {
    blocked.len() + omitted
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::NameNotFound { .. } => ErrorKind::NameNotFound,
            EvalError::NonFramePathSegment { .. } => ErrorKind::NonFramePathSegment,
            EvalError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            EvalError::ExternalResource { .. } => ErrorKind::ExternalResource,
            EvalError::Deadlock { .. } => ErrorKind::Deadlock,
            EvalError::Evaluation { .. } => ErrorKind::Evaluation,
            EvalError::InvalidName { .. } => ErrorKind::InvalidName,
        }
    }

    /// Where the error was detected, when it is tied to one place.
    pub fn location(&self) -> Option<&SourceRef> {
        match self {
            EvalError::NameNotFound { location, .. }
            | EvalError::NonFramePathSegment { location, .. }
            | EvalError::TypeMismatch { location, .. }
            | EvalError::Evaluation { location, .. }
            | EvalError::InvalidName { location, .. } => Some(location),
            EvalError::ExternalResource { .. } | EvalError::Deadlock { .. } => None,
        }
    }

    pub fn evaluation(location: &SourceRef, message: impl Into<String>) -> Self {
        EvalError::Evaluation {
            message: message.into(),
            location: location.clone(),
        }
    }
}
