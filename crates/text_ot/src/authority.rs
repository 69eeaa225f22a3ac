//! In-memory central authority.
//!
//! The authority orders operations from all clients into a single history.
//! An operation generated against an older revision is transformed against
//! everything that was accepted since, with the incoming operation as the
//! first transform argument, then applied and appended.

use crate::error::{OtError, OtResult};
use crate::operation::TextOperation;
use crate::selection::Selection;
use crate::wire::Edit;

/// Authoritative copy of the document and its operation history.
#[derive(Clone, Debug, Default)]
pub struct Authority {
    document: String,
    history: Vec<TextOperation>,
}

impl Authority {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            history: Vec::new(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Number of operations accepted so far.
    pub fn revision(&self) -> u64 {
        self.history.len() as u64
    }

    /// Operations accepted after `revision`.
    pub fn operations_since(&self, revision: u64) -> OtResult<&[TextOperation]> {
        let start = self.check_revision(revision)?;
        Ok(&self.history[start..])
    }

    /// Accept an operation a client generated against `revision`.
    ///
    /// Returns the operation as it applies to the latest document; this is
    /// what gets broadcast to the other clients.
    pub fn receive(&mut self, revision: u64, operation: TextOperation) -> OtResult<TextOperation> {
        let start = self.check_revision(revision)?;
        let operation = self.history[start..]
            .iter()
            .try_fold(operation, |op, concurrent| {
                TextOperation::transform(&op, concurrent).map(|(op, _)| op)
            })?;

        self.document = operation.apply(&self.document)?;
        self.history.push(operation.clone());
        tracing::debug!(
            "Accepted operation from revision {} as revision {}",
            revision,
            self.revision()
        );
        Ok(operation)
    }

    /// Accept a wire edit a client positioned against `revision`.
    pub fn receive_edit(&mut self, revision: u64, edit: &Edit) -> OtResult<TextOperation> {
        let len = self.document_len_at(revision)?;
        self.receive(revision, edit.to_operation(len)?)
    }

    /// Length in chars of the document as it was at `revision`.
    pub fn document_len_at(&self, revision: u64) -> OtResult<usize> {
        let start = self.check_revision(revision)?;
        Ok(match self.history.get(start) {
            Some(op) => op.base_len(),
            None => self.document.chars().count(),
        })
    }

    /// Bring a selection made at `revision` up to the latest document.
    pub fn transform_selection(&self, revision: u64, selection: &Selection) -> OtResult<Selection> {
        Ok(self
            .operations_since(revision)?
            .iter()
            .fold(selection.clone(), |selection, op| selection.transform(op)))
    }

    fn check_revision(&self, revision: u64) -> OtResult<usize> {
        let latest = self.revision();
        if revision > latest {
            return Err(OtError::InvalidRevision { revision, latest });
        }
        Ok(revision as usize)
    }
}
