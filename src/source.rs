//! Source location chains
//!
//! Evaluation does not follow the host call stack, so every unit records why it was
//! being evaluated as a chain of locations. Instantiation forks the chain: the
//! junction branch holds the template's own history.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq)]
struct SourceNode {
    message: String,
    file: String,
    start: (u32, u32),
    end: (u32, u32),
    caller: Option<SourceRef>,
    junction: Option<SourceRef>,
}

/// A shared, immutable link in a "why was this evaluated" chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef(Arc<SourceNode>);

impl SourceRef {
    pub fn new(
        message: impl Into<String>,
        file: impl Into<String>,
        start: (u32, u32),
        end: (u32, u32),
        caller: Option<SourceRef>,
    ) -> Self {
        SourceRef(Arc::new(SourceNode {
            message: message.into(),
            file: file.into(),
            start,
            end,
            caller,
            junction: None,
        }))
    }

    /// A location inside the engine or a native adapter.
    pub fn native(message: impl Into<String>) -> Self {
        Self::new(message, "<native>", (0, 0), (0, 0), None)
    }

    /// A location that bifurcates into `caller` and `junction`.
    pub fn junction(
        message: impl Into<String>,
        file: impl Into<String>,
        start: (u32, u32),
        end: (u32, u32),
        caller: Option<SourceRef>,
        junction: SourceRef,
    ) -> Self {
        SourceRef(Arc::new(SourceNode {
            message: message.into(),
            file: file.into(),
            start,
            end,
            caller,
            junction: Some(junction),
        }))
    }

    /// Push a new location on top of this chain.
    pub fn child(&self, message: impl Into<String>) -> Self {
        Self::new(message, "<native>", (0, 0), (0, 0), Some(self.clone()))
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn file(&self) -> &str {
        &self.0.file
    }

    pub fn caller(&self) -> Option<&SourceRef> {
        self.0.caller.as_ref()
    }

    pub fn junction_branch(&self) -> Option<&SourceRef> {
        self.0.junction.as_ref()
    }

    /// Render the chain as an indented tree.
    pub fn render(&self, prefix: &str) -> String {
        let mut out = String::new();
        let mut seen = HashSet::new();
        self.write_tree(&mut out, prefix, &mut seen);
        out
    }

    fn write_tree(&self, out: &mut String, prefix: &str, seen: &mut HashSet<*const SourceNode>) {
        // Walk the caller spine iteratively; only junctions recurse.
        let mut current = Some(self);
        while let Some(node) = current {
            let last = node.caller().is_none();
            out.push_str(prefix);
            match node.junction_branch() {
                None => {
                    out.push_str(if last { "└ " } else { "├ " });
                    node.write_location(out);
                    out.push('\n');
                }
                Some(junction) => {
                    out.push_str(if last { "└─┬ " } else { "├─┬ " });
                    node.write_location(out);
                    let ptr = Arc::as_ptr(&node.0);
                    if !seen.insert(ptr) {
                        out.push_str(" (previously mentioned)\n");
                        out.push_str(prefix);
                        out.push_str(if last { "  ┊\n" } else { "┊ ┊\n" });
                        return;
                    }
                    out.push('\n');
                    let nested = format!("{}{}", prefix, if last { "  " } else { "│ " });
                    junction.write_tree(out, &nested, seen);
                }
            }
            current = node.caller();
        }
    }

    fn write_location(&self, out: &mut String) {
        let node = &self.0;
        out.push_str(&format!(
            "{}: {}:{}-{}:{}: {}",
            node.file, node.start.0, node.start.1, node.end.0, node.end.1, node.message
        ));
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("  "))
    }
}
