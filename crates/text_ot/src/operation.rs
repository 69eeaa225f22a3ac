//! Text operations and their algebra.
//!
//! A [`TextOperation`] is an edit script over a plain-text document: a
//! sequence of retain, insert and delete components that walks the whole
//! input. Operations are values; the builder methods consume `self` and
//! return the extended operation, and every algebraic operation returns a
//! fresh one.
//!
//! All lengths are counted in `char`s.
//!
//! # Example
//!
//! ```
//! use text_ot::operation::TextOperation;
//!
//! let op = TextOperation::new().retain(5).insert(" world");
//! assert_eq!(op.apply("hello").unwrap(), "hello world");
//! ```

use crate::error::{OtError, OtResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single step of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    /// Keep the next `n` characters.
    Retain(usize),
    /// Insert the given text at the current position.
    Insert(String),
    /// Remove the next `n` characters.
    Delete(usize),
}

impl Component {
    /// Number of characters this component spans.
    pub fn len(&self) -> usize {
        match self {
            Component::Retain(n) | Component::Delete(n) => *n,
            Component::Insert(text) => text.chars().count(),
        }
    }

    /// Whether the component spans no characters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An edit script over a plain-text document.
///
/// The component list is always canonical: no empty components, no two
/// adjacent components of the same kind, and an insert is never placed
/// directly after a delete. Structural equality therefore coincides with
/// semantic equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<JsonComponent>", into = "Vec<JsonComponent>")]
pub struct TextOperation {
    components: Vec<Component>,
    base_len: usize,
    target_len: usize,
}

impl TextOperation {
    /// Create an empty operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an operation from raw components, normalizing them.
    pub fn from_components(components: impl IntoIterator<Item = Component>) -> Self {
        components
            .into_iter()
            .fold(Self::new(), |op, component| match component {
                Component::Retain(n) => op.retain(n),
                Component::Insert(text) => op.insert(text),
                Component::Delete(n) => op.delete(n),
            })
    }

    /// Skip over `n` characters.
    pub fn retain(mut self, n: usize) -> Self {
        if n == 0 {
            return self;
        }
        self.base_len += n;
        self.target_len += n;
        match self.components.last_mut() {
            Some(Component::Retain(last)) => *last += n,
            _ => self.components.push(Component::Retain(n)),
        }
        self
    }

    /// Insert `text` at the current position.
    pub fn insert(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return self;
        }
        self.target_len += text.chars().count();

        let count = self.components.len();
        match self.components.last_mut() {
            Some(Component::Insert(last)) => {
                last.push_str(&text);
                return self;
            }
            Some(Component::Delete(_)) => {}
            _ => {
                self.components.push(Component::Insert(text));
                return self;
            }
        }

        // Trailing delete: the insert goes in front of it.
        if count >= 2 {
            if let Component::Insert(prev) = &mut self.components[count - 2] {
                prev.push_str(&text);
                return self;
            }
        }
        self.components.insert(count - 1, Component::Insert(text));
        self
    }

    /// Delete the next `n` characters.
    pub fn delete(mut self, n: usize) -> Self {
        if n == 0 {
            return self;
        }
        self.base_len += n;
        match self.components.last_mut() {
            Some(Component::Delete(last)) => *last += n,
            _ => self.components.push(Component::Delete(n)),
        }
        self
    }

    /// The canonical component list.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Length of the documents this operation can be applied to.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Length of the document this operation produces.
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Whether applying the operation leaves every document unchanged.
    pub fn is_noop(&self) -> bool {
        matches!(self.components.as_slice(), [] | [Component::Retain(_)])
    }

    /// Apply the operation to `text`.
    pub fn apply(&self, text: &str) -> OtResult<String> {
        let len = text.chars().count();
        if len != self.base_len {
            return Err(OtError::LengthMismatch {
                expected: self.base_len,
                actual: len,
            });
        }

        let mut chars = text.chars();
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        for component in &self.components {
            match component {
                Component::Retain(n) => {
                    check_range(pos + n, len)?;
                    out.extend(chars.by_ref().take(*n));
                    pos += n;
                }
                Component::Insert(insert) => out.push_str(insert),
                Component::Delete(n) => {
                    check_range(pos + n, len)?;
                    chars.by_ref().take(*n).for_each(drop);
                    pos += n;
                }
            }
        }
        Ok(out)
    }

    /// Compute the operation that undoes `self` when applied after it.
    ///
    /// `text` must be the document `self` was applied to.
    pub fn invert(&self, text: &str) -> OtResult<TextOperation> {
        let len = text.chars().count();
        if len != self.base_len {
            return Err(OtError::LengthMismatch {
                expected: self.base_len,
                actual: len,
            });
        }

        let mut chars = text.chars();
        let mut inverse = TextOperation::new();
        for component in &self.components {
            inverse = match component {
                Component::Retain(n) => {
                    chars.by_ref().take(*n).for_each(drop);
                    inverse.retain(*n)
                }
                Component::Insert(insert) => inverse.delete(insert.chars().count()),
                Component::Delete(n) => inverse.insert(chars.by_ref().take(*n).collect::<String>()),
            };
        }
        Ok(inverse)
    }

    /// Combine two consecutive operations into one.
    ///
    /// `apply(apply(s, a), b) == apply(s, compose(a, b))`.
    pub fn compose(a: &TextOperation, b: &TextOperation) -> OtResult<TextOperation> {
        if a.target_len != b.base_len {
            return Err(OtError::IncompatibleLengths {
                left: a.target_len,
                right: b.base_len,
            });
        }

        let mut composed = TextOperation::new();
        let mut left = Cursor::new(&a.components);
        let mut right = Cursor::new(&b.components);
        loop {
            match (left.peek(), right.peek()) {
                (None, None) => break,
                (Some(Piece::Delete(n)), _) => {
                    composed = composed.delete(n);
                    left.advance(n);
                }
                (_, Some(Piece::Insert(text))) => {
                    composed = composed.insert(text);
                    right.advance_all();
                }
                (None, _) | (_, None) => {
                    return Err(OtError::IncompatibleLengths {
                        left: a.target_len,
                        right: b.base_len,
                    });
                }
                (Some(Piece::Retain(n1)), Some(Piece::Retain(n2))) => {
                    let n = n1.min(n2);
                    composed = composed.retain(n);
                    left.advance(n);
                    right.advance(n);
                }
                (Some(Piece::Insert(text)), Some(Piece::Delete(n2))) => {
                    // Text inserted by `a` and removed by `b` never shows up.
                    let n = text.chars().count().min(n2);
                    left.advance(n);
                    right.advance(n);
                }
                (Some(Piece::Insert(text)), Some(Piece::Retain(n2))) => {
                    let n = text.chars().count().min(n2);
                    composed = composed.insert(char_prefix(text, n));
                    left.advance(n);
                    right.advance(n);
                }
                (Some(Piece::Retain(n1)), Some(Piece::Delete(n2))) => {
                    let n = n1.min(n2);
                    composed = composed.delete(n);
                    left.advance(n);
                    right.advance(n);
                }
            }
        }
        Ok(composed)
    }

    /// Transform two concurrent operations against each other.
    ///
    /// Returns `(a', b')` such that `apply(apply(s, a), b') ==
    /// apply(apply(s, b), a')`. When both operations insert at the same
    /// position, the text inserted by `a` ends up first, so every caller
    /// must use the same role assignment for its two arguments.
    pub fn transform(a: &TextOperation, b: &TextOperation) -> OtResult<(TextOperation, TextOperation)> {
        if a.base_len != b.base_len {
            return Err(OtError::IncompatibleLengths {
                left: a.base_len,
                right: b.base_len,
            });
        }

        let mut a_prime = TextOperation::new();
        let mut b_prime = TextOperation::new();
        let mut left = Cursor::new(&a.components);
        let mut right = Cursor::new(&b.components);
        loop {
            match (left.peek(), right.peek()) {
                (None, None) => break,
                (Some(Piece::Insert(text)), _) => {
                    let n = text.chars().count();
                    a_prime = a_prime.insert(text);
                    b_prime = b_prime.retain(n);
                    left.advance(n);
                }
                (_, Some(Piece::Insert(text))) => {
                    let n = text.chars().count();
                    a_prime = a_prime.retain(n);
                    b_prime = b_prime.insert(text);
                    right.advance(n);
                }
                (None, _) | (_, None) => {
                    return Err(OtError::IncompatibleLengths {
                        left: a.base_len,
                        right: b.base_len,
                    });
                }
                (Some(Piece::Retain(n1)), Some(Piece::Retain(n2))) => {
                    let n = n1.min(n2);
                    a_prime = a_prime.retain(n);
                    b_prime = b_prime.retain(n);
                    left.advance(n);
                    right.advance(n);
                }
                (Some(Piece::Delete(n1)), Some(Piece::Delete(n2))) => {
                    let n = n1.min(n2);
                    left.advance(n);
                    right.advance(n);
                }
                (Some(Piece::Delete(n1)), Some(Piece::Retain(n2))) => {
                    let n = n1.min(n2);
                    a_prime = a_prime.delete(n);
                    left.advance(n);
                    right.advance(n);
                }
                (Some(Piece::Retain(n1)), Some(Piece::Delete(n2))) => {
                    let n = n1.min(n2);
                    b_prime = b_prime.delete(n);
                    left.advance(n);
                    right.advance(n);
                }
            }
        }
        Ok((a_prime, b_prime))
    }

    /// Encode as the compact JSON array form.
    pub fn to_json(&self) -> OtResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the compact JSON array form.
    pub fn from_json(json: &str) -> OtResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for TextOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match component {
                Component::Retain(n) => write!(f, "retain {}", n)?,
                Component::Insert(text) => write!(f, "insert {:?}", text)?,
                Component::Delete(n) => write!(f, "delete {}", n)?,
            }
        }
        Ok(())
    }
}

fn check_range(end: usize, len: usize) -> OtResult<()> {
    if end > len {
        return Err(OtError::OutOfRange { position: end, len });
    }
    Ok(())
}

/// The first `n` chars of `text`.
fn char_prefix(text: &str, n: usize) -> &str {
    let end = text.char_indices().nth(n).map_or(text.len(), |(i, _)| i);
    &text[..end]
}

/// What is left of the component under a [`Cursor`].
#[derive(Clone, Copy, Debug)]
enum Piece<'a> {
    Retain(usize),
    Insert(&'a str),
    Delete(usize),
}

/// Read-only position inside a component list.
///
/// `consumed` counts chars already taken from a retain or delete, and bytes
/// already taken from an insert.
struct Cursor<'a> {
    components: &'a [Component],
    index: usize,
    consumed: usize,
}

impl<'a> Cursor<'a> {
    fn new(components: &'a [Component]) -> Self {
        Self {
            components,
            index: 0,
            consumed: 0,
        }
    }

    fn peek(&self) -> Option<Piece<'a>> {
        let components: &'a [Component] = self.components;
        components.get(self.index).map(|component| match component {
            Component::Retain(n) => Piece::Retain(n - self.consumed),
            Component::Insert(text) => Piece::Insert(&text[self.consumed..]),
            Component::Delete(n) => Piece::Delete(n - self.consumed),
        })
    }

    /// Consume `n` chars of the current component.
    fn advance(&mut self, n: usize) {
        let (taken, total) = match &self.components[self.index] {
            Component::Retain(len) | Component::Delete(len) => (n, *len),
            Component::Insert(text) => (char_prefix(&text[self.consumed..], n).len(), text.len()),
        };
        self.consumed += taken;
        if self.consumed >= total {
            self.index += 1;
            self.consumed = 0;
        }
    }

    fn advance_all(&mut self) {
        self.index += 1;
        self.consumed = 0;
    }
}

/// One entry of the JSON form: positive = retain, negative = delete,
/// string = insert.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonComponent {
    Count(i64),
    Text(String),
}

impl From<TextOperation> for Vec<JsonComponent> {
    fn from(op: TextOperation) -> Self {
        op.components
            .into_iter()
            .map(|component| match component {
                Component::Retain(n) => JsonComponent::Count(n as i64),
                Component::Insert(text) => JsonComponent::Text(text),
                Component::Delete(n) => JsonComponent::Count(-(n as i64)),
            })
            .collect()
    }
}

impl TryFrom<Vec<JsonComponent>> for TextOperation {
    type Error = OtError;

    fn try_from(components: Vec<JsonComponent>) -> Result<Self, Self::Error> {
        components
            .into_iter()
            .try_fold(TextOperation::new(), |op, component| match component {
                JsonComponent::Count(n) if n > 0 => Ok(op.retain(n as usize)),
                JsonComponent::Count(n) if n < 0 => Ok(op.delete(n.unsigned_abs() as usize)),
                JsonComponent::Count(_) => {
                    Err(OtError::Serialization("zero-length component".to_string()))
                }
                JsonComponent::Text(text) => Ok(op.insert(text)),
            })
    }
}
