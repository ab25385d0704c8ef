//! Error sinks
//!
//! Every language-level error passes through one [`ErrorSink`] at the point it is
//! detected. Nothing unwinds: the failing unit just never completes.

use crate::error::{ErrorKind, EvalError};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::Write as _;

pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &EvalError);
}

/// Render an error with its lookup grid and source chain.
pub fn render(error: &EvalError) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", error);
    match error {
        EvalError::NameNotFound { attempts, .. } => {
            for attempt in attempts {
                let _ = writeln!(
                    out,
                    "  context {} segment {}: frame {} ({})",
                    attempt.context_index,
                    attempt.segment,
                    attempt.frame,
                    attempt.frame_location.message()
                );
            }
        }
        EvalError::Deadlock { blocked, omitted } => {
            for lookup in blocked {
                let _ = writeln!(out, "  {}", lookup);
                out.push_str(&lookup.location.render("    "));
            }
            if *omitted > 0 {
                let _ = writeln!(out, "  … and {} more", omitted);
            }
        }
        _ => {}
    }
    if let Some(location) = error.location() {
        out.push_str(&location.render("  "));
    }
    out
}

/// Writes rendered errors to standard error.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ErrorSink for ConsoleSink {
    fn report(&self, error: &EvalError) {
        let rendered = render(error);
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(rendered.as_bytes());
    }
}

/// Keeps every reported error, in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    errors: Mutex<Vec<EvalError>>,
}

impl CollectingSink {
    pub fn errors(&self) -> Vec<EvalError> {
        self.errors.lock().clone()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().iter().map(EvalError::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &EvalError) {
        self.errors.lock().push(error.clone());
    }
}
