//! Frameval: Execution Core for a Lazy Frame Language
//!
//! Resolves dotted names against chains of nested scopes, memoizes attribute
//! computation, and drives evaluation to completion on an explicit work queue instead
//! of the host call stack.

pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod future;
pub mod interlock;
pub mod logging;
pub mod lookup;
pub mod run;
pub mod scheduler;
pub mod source;
pub mod types;
pub mod value;

pub use context::Context;
pub use error::{EngineError, ErrorKind, EvalError};
pub use frame::{Attribute, Definition, Frame, Scope};
pub use future::Future;
pub use lookup::Lookup;
pub use scheduler::Scheduler;
pub use source::SourceRef;
pub use types::{FrameId, FutureId};
pub use value::{Value, ValueKind};
