//! Lookup Contexts
//!
//! An immutable, structurally shared chain of frames visible at one point of
//! evaluation. Forked contexts are never flattened; they are linearized lazily by
//! [`Context::frames`].

use crate::types::FrameId;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
enum Node {
    Link {
        head: FrameId,
        tail: Option<Context>,
        this: Option<FrameId>,
        len: usize,
    },
    Fork {
        first: Context,
        second: Context,
        len: usize,
    },
}

/// An ordered, non-empty chain of frames.
#[derive(Clone)]
pub struct Context(Arc<Node>);

impl Context {
    /// Push `head` in front of `tail`; `head` becomes the designated "this" frame.
    pub fn prepend(head: FrameId, tail: Option<&Context>) -> Context {
        Self::link(head, tail, Some(head))
    }

    /// Push `head` in front of `tail` without changing which frame is "this".
    ///
    /// Used for binding scopes whose frame should be searched but not treated as self.
    pub fn prepend_binding(head: FrameId, tail: Option<&Context>) -> Context {
        Self::link(head, tail, tail.and_then(Context::this))
    }

    fn link(head: FrameId, tail: Option<&Context>, this: Option<FrameId>) -> Context {
        let len = 1 + tail.map(Context::len).unwrap_or(0);
        Context(Arc::new(Node::Link {
            head,
            tail: tail.cloned(),
            this,
            len,
        }))
    }

    /// Walk every frame of `first`, then every frame of `second`.
    ///
    /// Appending nothing returns `first` itself.
    pub fn append(first: &Context, second: Option<&Context>) -> Context {
        match second {
            None => first.clone(),
            Some(second) => Context(Arc::new(Node::Fork {
                first: first.clone(),
                second: second.clone(),
                len: first.len() + second.len(),
            })),
        }
    }

    /// Total number of frames, counting shared tails once per occurrence.
    pub fn len(&self) -> usize {
        match &*self.0 {
            Node::Link { len, .. } | Node::Fork { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The innermost frame.
    pub fn head(&self) -> FrameId {
        let mut current = self;
        loop {
            match &*current.0 {
                Node::Link { head, .. } => return *head,
                Node::Fork { first, .. } => current = first,
            }
        }
    }

    /// The frame considered "this" at this point, if any.
    pub fn this(&self) -> Option<FrameId> {
        let mut current = self;
        loop {
            match &*current.0 {
                Node::Link { this, .. } => return *this,
                Node::Fork { first, .. } => current = first,
            }
        }
    }

    /// Lazy, restartable walk of the chain, front to back.
    pub fn frames(&self) -> Frames<'_> {
        Frames { stack: vec![self] }
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames()).finish()
    }
}

/// Iterator over the frames of a [`Context`].
pub struct Frames<'a> {
    stack: Vec<&'a Context>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = FrameId;

    fn next(&mut self) -> Option<FrameId> {
        while let Some(context) = self.stack.pop() {
            match &*context.0 {
                Node::Link { head, tail, .. } => {
                    if let Some(tail) = tail {
                        self.stack.push(tail);
                    }
                    return Some(*head);
                }
                Node::Fork { first, second, .. } => {
                    self.stack.push(second);
                    self.stack.push(first);
                }
            }
        }
        None
    }
}
