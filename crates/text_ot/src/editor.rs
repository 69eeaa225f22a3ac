//! Editor buffer collaborator.
//!
//! The text widget owns the document; the engine only touches it through
//! [`EditorBuffer`]. [`StringBuffer`] is a plain in-memory implementation.

use crate::error::{OtError, OtResult};
use crate::operation::{Component, TextOperation};
use crate::selection::Selection;

/// The editor widget as seen by the engine. Offsets are char indices.
pub trait EditorBuffer {
    /// Document length in chars.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the chars in `start..end` with `text`.
    fn apply_to_buffer(&mut self, start: usize, end: usize, text: &str) -> OtResult<()>;

    /// The local user's selection.
    fn selections(&self) -> Selection;

    fn set_selections(&mut self, selection: Selection);
}

/// Apply `op` to an editor and move its selection along.
///
/// Replacements are issued from the end of the document towards the start,
/// so each one is expressed in the original coordinates.
pub fn apply_to_editor<E: EditorBuffer + ?Sized>(editor: &mut E, op: &TextOperation) -> OtResult<()> {
    if editor.len() != op.base_len() {
        return Err(OtError::LengthMismatch {
            expected: op.base_len(),
            actual: editor.len(),
        });
    }

    let mut replacements: Vec<(usize, usize, &str)> = Vec::new();
    let mut pos = 0;
    for component in op.components() {
        match component {
            Component::Retain(n) => pos += n,
            Component::Insert(text) => replacements.push((pos, pos, text.as_str())),
            Component::Delete(n) => {
                match replacements.last_mut() {
                    // Canonical form puts an insert right before its delete.
                    Some((start, end, _)) if *start == pos && *end == pos => *end = pos + n,
                    _ => replacements.push((pos, pos + n, "")),
                }
                pos += n;
            }
        }
    }

    let selection = editor.selections().transform(op);
    for (start, end, text) in replacements.into_iter().rev() {
        editor.apply_to_buffer(start, end, text)?;
    }
    editor.set_selections(selection);
    Ok(())
}

/// In-memory editor buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringBuffer {
    text: String,
    selection: Selection,
}

impl StringBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selection: Selection::caret(0),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn byte_offset(&self, char_index: usize) -> OtResult<usize> {
        if char_index == self.len() {
            return Ok(self.text.len());
        }
        self.text
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .ok_or(OtError::OutOfRange {
                position: char_index,
                len: self.len(),
            })
    }
}

impl EditorBuffer for StringBuffer {
    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn apply_to_buffer(&mut self, start: usize, end: usize, text: &str) -> OtResult<()> {
        if start > end {
            return Err(OtError::OutOfRange {
                position: start,
                len: self.len(),
            });
        }
        let start = self.byte_offset(start)?;
        let end = self.byte_offset(end)?;
        self.text.replace_range(start..end, text);
        Ok(())
    }

    fn selections(&self) -> Selection {
        self.selection.clone()
    }

    fn set_selections(&mut self, selection: Selection) {
        self.selection = selection;
    }
}
