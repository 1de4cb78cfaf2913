//! Call stack tracking for evaluated sources.
//!
//! Every evaluation of a page, layout, partial, block, head or code unit pushes
//! a [`CallStackFrame`]. Frames are popped when the evaluation succeeds and left
//! in place when it fails, so that the failing render pass can snapshot the
//! exact chain of sources that led to the error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of object whose source is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Page,
    Template,
    Partial,
    Block,
    Head,
    PreActionCode,
    PostActionCode,
    AjaxHandlers,
}

impl ObjectType {
    /// Returns `true` for the designer-facing object types whose engine
    /// follows the theme configuration. Action and handler code is always
    /// evaluated by the inline-code engine.
    pub const fn is_template(self) -> bool {
        matches!(
            self,
            Self::Page | Self::Template | Self::Partial | Self::Block | Self::Head
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Page => "page",
            Self::Template => "template",
            Self::Partial => "partial",
            Self::Block => "block",
            Self::Head => "head",
            Self::PreActionCode => "page pre-action code",
            Self::PostActionCode => "page post-action code",
            Self::AjaxHandlers => "page AJAX handlers",
        };
        f.write_str(label)
    }
}

/// One entry of the evaluation stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStackFrame {
    pub object_type: ObjectType,
    pub name: String,
    pub source: String,
}

impl CallStackFrame {
    pub fn new(object_type: ObjectType, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            object_type,
            name: name.into(),
            source: source.into(),
        }
    }
}

/// A LIFO stack of [`CallStackFrame`]s owned by a single render pass.
///
/// # Examples
///
/// ```
/// use cms_rs_core::call_stack::{CallStack, CallStackFrame, ObjectType};
///
/// let mut stack = CallStack::new();
/// stack.push(CallStackFrame::new(ObjectType::Page, "Home", "<h1>Home</h1>"));
/// stack.push(CallStackFrame::new(ObjectType::Partial, "menu", ""));
/// assert_eq!(stack.len(), 2);
/// assert_eq!(stack.pop().unwrap().name, "menu");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    frames: Vec<CallStackFrame>,
}

impl CallStack {
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: CallStackFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<CallStackFrame> {
        self.frames.pop()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn top(&self) -> Option<&CallStackFrame> {
        self.frames.last()
    }

    /// Copies the current frames, outermost first.
    pub fn snapshot(&self) -> Vec<CallStackFrame> {
        self.frames.clone()
    }

    /// Drops every frame above `depth`. Used when a recoverable error is
    /// absorbed at a step boundary and the frames it left behind are stale.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
