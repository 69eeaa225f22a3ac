//! Client-side synchronization state machine.
//!
//! A client keeps at most one locally-originated operation in flight to the
//! authority. While it waits for the acknowledgment, further local edits are
//! composed into a buffer, and remote operations are transformed against both
//! so that they apply cleanly to the local document.
//!
//! The wire carries one insert or delete per message, so only the first edit
//! of a multi-edit operation goes into flight; the rest waits in the buffer.
//!
//! ```text
//!                  apply_client                  apply_client
//!  Synchronised ─────────────────▶ AwaitingConfirm ─────────────▶ AwaitingWithBuffer
//!       ▲                              │      ▲                         │
//!       └───────── server_ack ─────────┘      └────── server_ack ───────┘
//! ```

use crate::error::{OtError, OtResult};
use crate::operation::TextOperation;
use crate::selection::Selection;
use crate::wire::{edits_from_operation, operation_from_edits};

/// Collaborators the state machine drives.
pub trait ClientHandler {
    /// Send a local operation, generated against `revision`, to the authority.
    fn send_operation(&mut self, revision: u64, operation: &TextOperation);

    /// Apply an already-transformed remote operation to the local document.
    fn apply_operation(&mut self, operation: &TextOperation) -> OtResult<()>;
}

/// Where the client stands relative to the authority.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing local is outstanding.
    #[default]
    Synchronised,
    /// One operation has been sent and is not yet acknowledged.
    AwaitingConfirm { outstanding: TextOperation },
    /// One operation is in flight and later local edits wait in `buffer`.
    AwaitingWithBuffer {
        outstanding: TextOperation,
        buffer: TextOperation,
    },
}

impl SyncState {
    /// Short state name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::Synchronised => "Synchronised",
            SyncState::AwaitingConfirm { .. } => "AwaitingConfirm",
            SyncState::AwaitingWithBuffer { .. } => "AwaitingWithBuffer",
        }
    }

    /// The operation currently in flight, if any.
    pub fn outstanding(&self) -> Option<&TextOperation> {
        match self {
            SyncState::Synchronised => None,
            SyncState::AwaitingConfirm { outstanding }
            | SyncState::AwaitingWithBuffer { outstanding, .. } => Some(outstanding),
        }
    }

    /// Local edits waiting behind the outstanding operation, if any.
    pub fn buffer(&self) -> Option<&TextOperation> {
        match self {
            SyncState::AwaitingWithBuffer { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Length of the authority's document at the client's revision, given
    /// the length of the local document.
    pub fn authority_len(&self, local_len: usize) -> usize {
        self.outstanding().map_or(local_len, TextOperation::base_len)
    }

    /// Handle a local edit made against `revision`.
    pub fn apply_client<H: ClientHandler>(
        &self,
        revision: u64,
        operation: TextOperation,
        handler: &mut H,
    ) -> OtResult<SyncState> {
        // Nothing to send, and a no-op in flight would never be confirmed.
        if operation.is_noop() {
            return Ok(self.clone());
        }
        match self {
            SyncState::Synchronised => send_first_edit(revision, operation, handler),
            SyncState::AwaitingConfirm { outstanding } => Ok(SyncState::AwaitingWithBuffer {
                outstanding: outstanding.clone(),
                buffer: operation,
            }),
            SyncState::AwaitingWithBuffer {
                outstanding,
                buffer,
            } => Ok(SyncState::AwaitingWithBuffer {
                outstanding: outstanding.clone(),
                buffer: TextOperation::compose(buffer, &operation)?,
            }),
        }
    }

    /// Handle an operation the authority broadcast from another participant.
    pub fn apply_server<H: ClientHandler>(
        &self,
        operation: &TextOperation,
        handler: &mut H,
    ) -> OtResult<SyncState> {
        match self {
            SyncState::Synchronised => {
                handler.apply_operation(operation)?;
                Ok(SyncState::Synchronised)
            }
            SyncState::AwaitingConfirm { outstanding } => {
                let (outstanding, remote) = TextOperation::transform(outstanding, operation)?;
                handler.apply_operation(&remote)?;
                Ok(SyncState::AwaitingConfirm { outstanding })
            }
            SyncState::AwaitingWithBuffer {
                outstanding,
                buffer,
            } => {
                let (outstanding, remote) = TextOperation::transform(outstanding, operation)?;
                let (buffer, remote) = TextOperation::transform(buffer, &remote)?;
                handler.apply_operation(&remote)?;
                Ok(SyncState::AwaitingWithBuffer {
                    outstanding,
                    buffer,
                })
            }
        }
    }

    /// Handle the acknowledgment of the outstanding operation.
    ///
    /// `revision` is the client revision after counting the acknowledged
    /// operation; a buffered edit is sent against it.
    pub fn server_ack<H: ClientHandler>(&self, revision: u64, handler: &mut H) -> OtResult<SyncState> {
        match self {
            SyncState::Synchronised => Err(OtError::NoOutstandingOperation),
            SyncState::AwaitingConfirm { .. } => Ok(SyncState::Synchronised),
            SyncState::AwaitingWithBuffer { buffer, .. } => {
                if buffer.is_noop() {
                    return Ok(SyncState::Synchronised);
                }
                send_first_edit(revision, buffer.clone(), handler)
            }
        }
    }

    /// Send the outstanding operation again. The buffer is never sent.
    pub fn resend<H: ClientHandler>(&self, revision: u64, handler: &mut H) {
        if let Some(outstanding) = self.outstanding() {
            handler.send_operation(revision, outstanding);
        }
    }

    /// Map a selection from the authority's document onto the local one.
    pub fn transform_selection(&self, selection: &Selection) -> Selection {
        match self {
            SyncState::Synchronised => selection.clone(),
            SyncState::AwaitingConfirm { outstanding } => selection.transform(outstanding),
            SyncState::AwaitingWithBuffer {
                outstanding,
                buffer,
            } => selection.transform(outstanding).transform(buffer),
        }
    }
}

/// Send the first edit of `operation` and buffer whatever follows it.
fn send_first_edit<H: ClientHandler>(
    revision: u64,
    operation: TextOperation,
    handler: &mut H,
) -> OtResult<SyncState> {
    let edits = edits_from_operation(&operation);
    let (outstanding, buffer) = match edits.split_first() {
        Some((first, rest)) if !rest.is_empty() => {
            let first = first.to_operation(operation.base_len())?;
            let rest = operation_from_edits(rest, first.target_len())?;
            (first, Some(rest))
        }
        _ => (operation, None),
    };
    handler.send_operation(revision, &outstanding);
    Ok(match buffer {
        Some(buffer) => SyncState::AwaitingWithBuffer { outstanding, buffer },
        None => SyncState::AwaitingConfirm { outstanding },
    })
}

/// One participant's view of the shared document.
///
/// Every transition computes the next [`SyncState`] first and only replaces
/// the current one when it succeeded, so a failed call leaves the client
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct Client {
    revision: u64,
    state: SyncState,
}

impl Client {
    /// Create a client that has seen `revision` operations.
    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            state: SyncState::Synchronised,
        }
    }

    /// The last authority revision this client has incorporated.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Whether the client has local edits the authority has not confirmed.
    pub fn has_pending(&self) -> bool {
        !matches!(self.state, SyncState::Synchronised)
    }

    /// Feed an edit the user made locally.
    pub fn apply_client<H: ClientHandler>(&mut self, operation: TextOperation, handler: &mut H) -> OtResult<()> {
        let next = self.state.apply_client(self.revision, operation, handler)?;
        self.transition(next);
        Ok(())
    }

    /// Feed an operation broadcast by the authority.
    pub fn apply_server<H: ClientHandler>(&mut self, operation: &TextOperation, handler: &mut H) -> OtResult<()> {
        let next = self.state.apply_server(operation, handler)?;
        self.revision += 1;
        self.transition(next);
        Ok(())
    }

    /// Feed the authority's acknowledgment of our outstanding operation.
    pub fn server_ack<H: ClientHandler>(&mut self, handler: &mut H) -> OtResult<()> {
        let next = self.state.server_ack(self.revision + 1, handler)?;
        self.revision += 1;
        self.transition(next);
        Ok(())
    }

    /// Re-dispatch the outstanding operation after a suspected lost ack.
    pub fn resend<H: ClientHandler>(&self, handler: &mut H) {
        if let Some(outstanding) = self.state.outstanding() {
            tracing::debug!(
                "Resending outstanding operation at revision {}: {}",
                self.revision,
                outstanding
            );
        }
        self.state.resend(self.revision, handler);
    }

    /// Map a remote participant's selection onto the local document.
    pub fn transform_selection(&self, selection: &Selection) -> Selection {
        self.state.transform_selection(selection)
    }

    /// Length of the authority's document at [`Client::revision`].
    pub fn authority_len(&self, local_len: usize) -> usize {
        self.state.authority_len(local_len)
    }

    fn transition(&mut self, next: SyncState) {
        if self.state.name() != next.name() {
            tracing::debug!(
                "Client state {} -> {} at revision {}",
                self.state.name(),
                next.name(),
                self.revision
            );
        }
        self.state = next;
    }
}
