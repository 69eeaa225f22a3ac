//! Operational transformation for real-time collaborative plain-text editing.
//!
//! Several participants edit one shared document. Each client applies its own
//! edits immediately, sends them to a central authority one at a time, and
//! transforms incoming remote operations against whatever it has not had
//! confirmed yet, so that every replica converges to the same text.
//!
//! # Modules
//!
//! - `operation`: Text operations with apply, invert, compose and transform
//! - `selection`: Cursor and selection remapping under operations
//! - `client`: Per-client synchronization state machine
//! - `queue`: Outgoing edit queue with merging and single in-flight dispatch
//! - `presence`: Registry of remote participants and their selections
//! - `session`: Client, queue and editor wired together for one participant
//! - `wire`: JSON message types exchanged with the network
//! - `editor`: Editor buffer collaborator interface
//! - `authority`: In-memory central authority
//! - `error`: Error types for the crate
//!
//! # Example
//!
//! ```
//! use text_ot::{Client, ClientHandler, OtResult, TextOperation};
//!
//! struct Outbox {
//!     document: String,
//!     sent: Vec<(u64, TextOperation)>,
//! }
//!
//! impl ClientHandler for Outbox {
//!     fn send_operation(&mut self, revision: u64, operation: &TextOperation) {
//!         self.sent.push((revision, operation.clone()));
//!     }
//!
//!     fn apply_operation(&mut self, operation: &TextOperation) -> OtResult<()> {
//!         self.document = operation.apply(&self.document)?;
//!         Ok(())
//!     }
//! }
//!
//! let mut outbox = Outbox { document: "hello".to_string(), sent: Vec::new() };
//! let mut client = Client::new(0);
//!
//! // A local edit is applied by the editor and then handed to the client.
//! let local = TextOperation::new().retain(5).insert(" world");
//! outbox.document = local.apply(&outbox.document).unwrap();
//! client.apply_client(local, &mut outbox).unwrap();
//! assert_eq!(outbox.sent.len(), 1);
//!
//! // A concurrent remote edit is transformed before it is applied.
//! let remote = TextOperation::new().delete(1).retain(4);
//! client.apply_server(&remote, &mut outbox).unwrap();
//! assert_eq!(outbox.document, "ello world");
//! ```

pub mod authority;
pub mod client;
pub mod editor;
pub mod error;
pub mod operation;
pub mod presence;
pub mod queue;
pub mod selection;
pub mod session;
pub mod wire;

// Re-export commonly used types
pub use authority::Authority;
pub use client::{Client, ClientHandler, SyncState};
pub use editor::{apply_to_editor, EditorBuffer, StringBuffer};
pub use error::{OtError, OtResult, TransportError};
pub use operation::{Component, TextOperation};
pub use presence::{Participant, ParticipantRegistry, RegistryConfig, RemoteSelection};
pub use queue::{merge_edits, Merged, OutgoingQueue, PendingOperation, QueueConfig, Transport};
pub use selection::{transform_index, Range, Selection};
pub use session::{ServerEvent, Session};
pub use wire::{edits_from_operation, operation_from_edits, Edit, SelectionDto, WireBroadcast, WireOperation};
