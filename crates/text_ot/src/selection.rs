//! Cursor and selection tracking under operations.
//!
//! Offsets are char indices into the document. A [`Range`] whose anchor and
//! head coincide is a caret.

use crate::operation::{Component, TextOperation};
use serde::{Deserialize, Serialize};

/// Map a char offset through an operation.
///
/// Insertions at or before the offset push it forward; deletions before it
/// pull it back, clamped to the start of the deleted span.
pub fn transform_index(index: usize, op: &TextOperation) -> usize {
    let mut remaining = index as isize;
    let mut new_index = index;
    for component in op.components() {
        match component {
            Component::Retain(n) => remaining -= *n as isize,
            Component::Insert(text) => new_index += text.chars().count(),
            Component::Delete(n) => {
                new_index -= (remaining.max(0) as usize).min(*n);
                remaining -= *n as isize;
            }
        }
        if remaining < 0 {
            break;
        }
    }
    new_index
}

/// A selection range or caret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub anchor: usize,
    pub head: usize,
}

impl Range {
    /// Create a new range
    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    /// A collapsed range at `pos`.
    pub fn caret(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    /// Check if this is a caret
    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    pub fn start(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Map both ends through `op`.
    pub fn transform(&self, op: &TextOperation) -> Range {
        let anchor = transform_index(self.anchor, op);
        if self.is_empty() {
            return Range::caret(anchor);
        }
        Range::new(anchor, transform_index(self.head, op))
    }
}

/// All ranges of one participant, primary range first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub ranges: Vec<Range>,
}

impl Selection {
    pub fn new(ranges: Vec<Range>) -> Self {
        Self { ranges }
    }

    /// A selection with one range.
    pub fn single(anchor: usize, head: usize) -> Self {
        Self::new(vec![Range::new(anchor, head)])
    }

    /// A selection holding a single caret.
    pub fn caret(pos: usize) -> Self {
        Self::new(vec![Range::caret(pos)])
    }

    pub fn primary(&self) -> Option<&Range> {
        self.ranges.first()
    }

    /// Whether any range selects at least one character.
    pub fn something_selected(&self) -> bool {
        self.ranges.iter().any(|range| !range.is_empty())
    }

    /// Replace this selection with a newer one.
    ///
    /// Selections carry no history, so composing keeps the latest.
    pub fn compose(&self, other: &Selection) -> Selection {
        other.clone()
    }

    /// Map every range through `op`.
    pub fn transform(&self, op: &TextOperation) -> Selection {
        Selection::new(self.ranges.iter().map(|range| range.transform(op)).collect())
    }
}

impl From<Range> for Selection {
    fn from(range: Range) -> Self {
        Selection::new(vec![range])
    }
}
