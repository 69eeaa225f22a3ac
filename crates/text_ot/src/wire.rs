//! Wire message types.
//!
//! These types match the JSON the network collaborator exchanges:
//!
//! ```json
//! { "id": "…", "trans": { "type": "insert", "pos": 5, "content": "a" } }
//! { "id": "…", "trans": { "type": "delete", "pos": 0, "length": 1 } }
//! ```
//!
//! Broadcasts and acknowledgments add `timestamp` and `user_id` at the top
//! level. Positions and lengths are char offsets.

use crate::error::{OtError, OtResult};
use crate::operation::{Component, TextOperation};
use crate::selection::{Range, Selection};
use serde::{Deserialize, Serialize};

/// A single insert or delete at an absolute position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Edit {
    Insert { pos: usize, content: String },
    Delete { pos: usize, length: usize },
}

impl Edit {
    pub fn insert(pos: usize, content: impl Into<String>) -> Self {
        Edit::Insert {
            pos,
            content: content.into(),
        }
    }

    pub fn delete(pos: usize, length: usize) -> Self {
        Edit::Delete { pos, length }
    }

    pub fn pos(&self) -> usize {
        match self {
            Edit::Insert { pos, .. } | Edit::Delete { pos, .. } => *pos,
        }
    }

    /// Number of chars inserted or deleted.
    pub fn len(&self) -> usize {
        match self {
            Edit::Insert { content, .. } => content.chars().count(),
            Edit::Delete { length, .. } => *length,
        }
    }

    /// Whether the edit changes nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Express the edit as an operation over a document of `doc_len` chars.
    pub fn to_operation(&self, doc_len: usize) -> OtResult<TextOperation> {
        match self {
            Edit::Insert { pos, content } => {
                if *pos > doc_len {
                    return Err(OtError::OutOfRange {
                        position: *pos,
                        len: doc_len,
                    });
                }
                Ok(TextOperation::new()
                    .retain(*pos)
                    .insert(content.as_str())
                    .retain(doc_len - pos))
            }
            Edit::Delete { pos, length } => {
                let end = match pos.checked_add(*length) {
                    Some(end) if end <= doc_len => end,
                    end => {
                        return Err(OtError::OutOfRange {
                            position: end.unwrap_or(usize::MAX),
                            len: doc_len,
                        })
                    }
                };
                Ok(TextOperation::new()
                    .retain(*pos)
                    .delete(*length)
                    .retain(doc_len - end))
            }
        }
    }
}

/// Split an operation into edits that reproduce it when applied in order.
pub fn edits_from_operation(op: &TextOperation) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut pos = 0;
    for component in op.components() {
        match component {
            Component::Retain(n) => pos += n,
            Component::Insert(text) => {
                edits.push(Edit::insert(pos, text.as_str()));
                pos += text.chars().count();
            }
            Component::Delete(n) => edits.push(Edit::delete(pos, *n)),
        }
    }
    edits
}

/// Fold a run of edits, each applying to the result of the previous one,
/// into a single operation over a document of `doc_len` chars.
pub fn operation_from_edits(edits: &[Edit], doc_len: usize) -> OtResult<TextOperation> {
    edits
        .iter()
        .try_fold(TextOperation::new().retain(doc_len), |acc, edit| {
            let next = edit.to_operation(acc.target_len())?;
            TextOperation::compose(&acc, &next)
        })
}

/// A client operation as sent to the authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOperation {
    pub id: String,
    pub trans: Edit,
}

impl WireOperation {
    /// Wrap an edit with a fresh id.
    pub fn new(trans: Edit) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), trans)
    }

    pub fn with_id(id: impl Into<String>, trans: Edit) -> Self {
        Self { id: id.into(), trans }
    }
}

/// An operation as the authority acknowledges or broadcasts it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBroadcast {
    #[serde(flatten)]
    pub operation: WireOperation,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub user_id: String,
}

impl WireBroadcast {
    /// Stamp an operation with the current time and its author.
    pub fn new(operation: WireOperation, user_id: impl Into<String>) -> Self {
        let timestamp = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            operation,
            timestamp,
            user_id: user_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.operation.id
    }
}

/// Selection range as exchanged with other participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionDto {
    pub anchor: usize,
    pub head: usize,
}

impl From<Range> for SelectionDto {
    fn from(range: Range) -> Self {
        Self {
            anchor: range.anchor,
            head: range.head,
        }
    }
}

impl From<SelectionDto> for Range {
    fn from(dto: SelectionDto) -> Self {
        Range::new(dto.anchor, dto.head)
    }
}

impl From<&Selection> for Vec<SelectionDto> {
    fn from(selection: &Selection) -> Self {
        selection.ranges.iter().copied().map(SelectionDto::from).collect()
    }
}

impl From<Vec<SelectionDto>> for Selection {
    fn from(dtos: Vec<SelectionDto>) -> Self {
        Selection::new(dtos.into_iter().map(Range::from).collect())
    }
}
