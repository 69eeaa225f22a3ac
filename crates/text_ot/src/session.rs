//! Collaboration session for one local participant.
//!
//! This module wires the pieces of the client side together:
//!
//! - Local edits are applied to the editor and fed to the [`Client`]
//! - Whatever the client decides to send goes through the [`OutgoingQueue`]
//! - Acknowledgments and remote operations coming back from the network
//!   collaborator are routed to both the queue and the client
//! - Remote operations and selections are mapped onto the local document

use crate::client::{Client, ClientHandler};
use crate::editor::{apply_to_editor, EditorBuffer};
use crate::error::OtResult;
use crate::operation::TextOperation;
use crate::presence::{Participant, ParticipantRegistry};
use crate::queue::{OutgoingQueue, QueueConfig, Transport};
use crate::selection::Selection;
use crate::wire::{edits_from_operation, operation_from_edits, Edit, SelectionDto};

/// A message the network collaborator hands back to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// The authority accepted our in-flight edit.
    Ack { id: String },
    /// Another participant's operation, as the edits making up one revision.
    Remote { edits: Vec<Edit> },
}

/// Client collaborator that writes to the editor and collects sends.
struct Dispatcher<'a, E> {
    editor: &'a mut E,
    registry: &'a mut ParticipantRegistry,
    sends: Vec<(u64, TextOperation)>,
}

impl<'a, E: EditorBuffer> Dispatcher<'a, E> {
    fn new(editor: &'a mut E, registry: &'a mut ParticipantRegistry) -> Self {
        Self {
            editor,
            registry,
            sends: Vec::new(),
        }
    }
}

impl<E: EditorBuffer> ClientHandler for Dispatcher<'_, E> {
    fn send_operation(&mut self, revision: u64, operation: &TextOperation) {
        self.sends.push((revision, operation.clone()));
    }

    fn apply_operation(&mut self, operation: &TextOperation) -> OtResult<()> {
        apply_to_editor(&mut *self.editor, operation)?;
        self.registry.transform_all(operation);
        Ok(())
    }
}

/// One participant's end of a shared document.
pub struct Session<T: Transport, E: EditorBuffer> {
    client: Client,
    editor: E,
    registry: ParticipantRegistry,
    queue: OutgoingQueue<T>,
}

impl<T: Transport, E: EditorBuffer> Session<T, E> {
    /// Join at `revision` with an editor holding that revision's text.
    pub fn new(revision: u64, editor: E, transport: T) -> Self {
        Self::with_config(revision, editor, transport, QueueConfig::default())
    }

    pub fn with_config(revision: u64, editor: E, transport: T, config: QueueConfig) -> Self {
        Self {
            client: Client::new(revision),
            editor,
            registry: ParticipantRegistry::new(),
            queue: OutgoingQueue::with_config(transport, config),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParticipantRegistry {
        &mut self.registry
    }

    pub fn queue(&self) -> &OutgoingQueue<T> {
        &self.queue
    }

    /// Apply a local edit and hand it to the authority.
    ///
    /// A transport failure is returned after the edit has been applied and
    /// queued; it goes out once the queue is back online.
    pub async fn local_edit(&mut self, operation: TextOperation) -> OtResult<()> {
        apply_to_editor(&mut self.editor, &operation)?;
        self.registry.transform_all(&operation);

        let mut dispatcher = Dispatcher::new(&mut self.editor, &mut self.registry);
        self.client.apply_client(operation, &mut dispatcher)?;
        let sends = dispatcher.sends;
        self.dispatch(sends).await
    }

    /// Route a message from the network collaborator.
    pub async fn handle_event(&mut self, event: ServerEvent) -> OtResult<()> {
        match event {
            ServerEvent::Ack { id } => self.handle_ack(&id).await,
            ServerEvent::Remote { edits } => self.apply_remote(&edits),
        }
    }

    /// The authority accepted the in-flight edit `id`.
    pub async fn handle_ack(&mut self, id: &str) -> OtResult<()> {
        let accepted_as = self.client.revision() + 1;
        self.queue.acknowledge(id, accepted_as).await?;

        let mut dispatcher = Dispatcher::new(&mut self.editor, &mut self.registry);
        self.client.server_ack(&mut dispatcher)?;
        let sends = dispatcher.sends;
        self.dispatch(sends).await
    }

    /// Apply one revision made by another participant.
    ///
    /// `edits` are positioned against the authority's document at our
    /// revision and apply in order.
    pub fn apply_remote(&mut self, edits: &[Edit]) -> OtResult<()> {
        let base_len = self.client.authority_len(self.editor.len());
        let operation = operation_from_edits(edits, base_len)?;

        let mut dispatcher = Dispatcher::new(&mut self.editor, &mut self.registry);
        self.client.apply_server(&operation, &mut dispatcher)
    }

    /// Record where another participant's selection is.
    pub fn update_remote_selection(&mut self, user_id: &str, ranges: Vec<SelectionDto>) -> &Participant {
        let selection = self.client.transform_selection(&Selection::from(ranges));
        self.registry.update_selection(user_id, selection)
    }

    /// Change connectivity; going online resumes dispatch.
    pub async fn set_online(&self, online: bool) -> OtResult<()> {
        self.queue.set_online(online).await
    }

    /// Send the in-flight edit again after an ack timeout.
    pub async fn resend(&self) -> OtResult<()> {
        self.queue.resend().await
    }

    async fn dispatch(&self, sends: Vec<(u64, TextOperation)>) -> OtResult<()> {
        for (revision, operation) in sends {
            self.queue.enqueue(edits_from_operation(&operation), revision).await?;
        }
        Ok(())
    }
}
