//! Integration tests for the OT engine
//! Tests convergence of several clients talking to one authority
//!
//! These tests simulate real collaborative editing sessions: every client
//! edits its own replica, messages travel through an in-memory authority,
//! and deliveries are interleaved in controlled (or random) orders. All
//! replicas must end up with the authority's document.

use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use text_ot::{
    apply_to_editor, edits_from_operation, Authority, Client, ClientHandler, Edit, EditorBuffer,
    OtResult, OutgoingQueue, ParticipantRegistry, Selection, ServerEvent, Session, StringBuffer,
    SyncState, TextOperation, Transport, TransportError, WireOperation,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Messages the authority sends to a client.
#[derive(Clone, Debug)]
enum ServerMessage {
    Ack,
    Remote(TextOperation),
}

/// The client's collaborators: its editor, outbox and remote cursors.
struct Peer {
    editor: StringBuffer,
    outbox: Vec<(u64, TextOperation)>,
    registry: ParticipantRegistry,
}

impl ClientHandler for Peer {
    fn send_operation(&mut self, revision: u64, operation: &TextOperation) {
        self.outbox.push((revision, operation.clone()));
    }

    fn apply_operation(&mut self, operation: &TextOperation) -> OtResult<()> {
        apply_to_editor(&mut self.editor, operation)?;
        self.registry.transform_all(operation);
        Ok(())
    }
}

struct SimulatedClient {
    client: Client,
    peer: Peer,
}

/// Test harness for simulating multiple clients
struct CollaborationHarness {
    authority: Authority,
    clients: Vec<SimulatedClient>,
    /// Per-client queue of undelivered server messages
    inboxes: Vec<VecDeque<ServerMessage>>,
}

impl CollaborationHarness {
    fn new(document: &str, client_count: usize) -> Self {
        let clients = (0..client_count)
            .map(|_| SimulatedClient {
                client: Client::new(0),
                peer: Peer {
                    editor: StringBuffer::new(document),
                    outbox: Vec::new(),
                    registry: ParticipantRegistry::new(),
                },
            })
            .collect();
        Self {
            authority: Authority::new(document),
            clients,
            inboxes: vec![VecDeque::new(); client_count],
        }
    }

    /// Make a local edit on a client.
    fn edit(&mut self, idx: usize, op: TextOperation) {
        let sim = &mut self.clients[idx];
        apply_to_editor(&mut sim.peer.editor, &op).unwrap();
        sim.peer.registry.transform_all(&op);
        sim.client.apply_client(op, &mut sim.peer).unwrap();
    }

    /// Deliver everything in a client's outbox to the authority.
    fn flush_outbox(&mut self, idx: usize) {
        let outbox: Vec<_> = self.clients[idx].peer.outbox.drain(..).collect();
        for (revision, op) in outbox {
            let accepted = self.authority.receive(revision, op).unwrap();
            for (j, inbox) in self.inboxes.iter_mut().enumerate() {
                if j == idx {
                    inbox.push_back(ServerMessage::Ack);
                } else {
                    inbox.push_back(ServerMessage::Remote(accepted.clone()));
                }
            }
        }
    }

    /// Deliver the next server message to a client. Returns false if none.
    fn deliver_one(&mut self, idx: usize) -> bool {
        let Some(message) = self.inboxes[idx].pop_front() else {
            return false;
        };
        let sim = &mut self.clients[idx];
        match message {
            ServerMessage::Ack => sim.client.server_ack(&mut sim.peer).unwrap(),
            ServerMessage::Remote(op) => sim.client.apply_server(&op, &mut sim.peer).unwrap(),
        }
        true
    }

    fn run_until_quiet(&mut self) {
        loop {
            let mut progressed = false;
            for idx in 0..self.clients.len() {
                if !self.clients[idx].peer.outbox.is_empty() {
                    self.flush_outbox(idx);
                    progressed = true;
                }
                while self.deliver_one(idx) {
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn text(&self, idx: usize) -> &str {
        self.clients[idx].peer.editor.text()
    }

    fn assert_converged(&self) {
        for (idx, sim) in self.clients.iter().enumerate() {
            assert_eq!(
                sim.peer.editor.text(),
                self.authority.document(),
                "client {} diverged",
                idx
            );
            assert_eq!(sim.client.state(), &SyncState::Synchronised);
            assert_eq!(sim.client.revision(), self.authority.revision());
        }
    }
}

fn insert_at(len: usize, pos: usize, text: &str) -> TextOperation {
    TextOperation::new().retain(pos).insert(text).retain(len - pos)
}

fn delete_at(len: usize, pos: usize, count: usize) -> TextOperation {
    TextOperation::new().retain(pos).delete(count).retain(len - pos - count)
}

#[test]
fn test_hello_world_concurrent_edits() {
    let mut harness = CollaborationHarness::new("hello", 2);
    harness.edit(0, insert_at(5, 5, " world"));
    harness.edit(1, delete_at(5, 0, 1));

    harness.flush_outbox(0);
    harness.flush_outbox(1);
    harness.run_until_quiet();

    harness.assert_converged();
    assert_eq!(harness.text(0), "ello world");
}

#[test]
fn test_same_position_inserts_converge() {
    let mut harness = CollaborationHarness::new("x", 3);
    harness.edit(0, insert_at(1, 0, "A"));
    harness.edit(1, insert_at(1, 0, "B"));
    harness.edit(2, insert_at(1, 0, "C"));

    harness.flush_outbox(2);
    harness.flush_outbox(0);
    harness.flush_outbox(1);
    harness.run_until_quiet();

    harness.assert_converged();
    assert_eq!(harness.text(0).chars().count(), 4);
}

#[test]
fn test_buffered_edits_converge() {
    let mut harness = CollaborationHarness::new("abc", 2);
    harness.edit(0, insert_at(3, 3, "d"));
    harness.edit(0, insert_at(4, 4, "e"));
    harness.edit(0, delete_at(5, 0, 1));
    harness.edit(1, insert_at(3, 1, "XY"));
    harness.edit(1, delete_at(5, 3, 2));

    // Client 1's first operation reaches the authority first, and client 0
    // sees it while still holding a buffer.
    harness.flush_outbox(1);
    harness.flush_outbox(0);
    assert!(harness.deliver_one(0));
    assert!(matches!(
        harness.clients[0].client.state(),
        SyncState::AwaitingWithBuffer { .. }
    ));

    harness.run_until_quiet();
    harness.assert_converged();
}

#[test]
fn test_remote_delete_while_awaiting_confirm() {
    let mut harness = CollaborationHarness::new("ab", 2);
    harness.edit(0, insert_at(2, 0, "X"));
    harness.edit(1, delete_at(2, 0, 1));
    harness.flush_outbox(1);
    assert!(harness.deliver_one(0));

    assert_eq!(harness.text(0), "Xb");
    assert_eq!(
        harness.clients[0].client.state(),
        &SyncState::AwaitingConfirm {
            outstanding: insert_at(1, 0, "X")
        }
    );

    harness.run_until_quiet();
    harness.assert_converged();
    assert_eq!(harness.text(1), "Xb");
}

#[test]
fn test_resend_after_lost_message() {
    let mut harness = CollaborationHarness::new("abc", 2);
    harness.edit(0, insert_at(3, 3, "!"));
    harness.edit(0, insert_at(4, 0, "<"));

    // The first send is lost on the way to the authority.
    harness.clients[0].peer.outbox.clear();

    // Meanwhile a remote edit is transformed onto the outstanding operation.
    harness.edit(1, delete_at(3, 1, 1));
    harness.flush_outbox(1);
    assert!(harness.deliver_one(0));
    let outstanding = harness.clients[0].client.state().outstanding().cloned().unwrap();

    let sim = &mut harness.clients[0];
    sim.client.resend(&mut sim.peer);
    assert_eq!(sim.peer.outbox, vec![(1, outstanding)]);
    assert!(sim.client.state().buffer().is_some());

    harness.run_until_quiet();
    harness.assert_converged();
    assert_eq!(harness.text(0), "<ac!");
}

#[test]
fn test_remote_cursors_follow_edits() {
    let mut harness = CollaborationHarness::new("hello world", 2);

    // Client 0 learns where client 1's cursor is.
    let remote = harness.clients[0].client.transform_selection(&Selection::caret(6));
    harness.clients[0].peer.registry.update_selection("client-1", remote);

    // Client 1 inserts before its cursor; client 0 receives it.
    harness.edit(1, insert_at(11, 0, ">> "));
    harness.run_until_quiet();
    harness.assert_converged();

    let tracked = harness.clients[0].peer.registry.get("client-1").unwrap();
    assert_eq!(tracked.selection, Selection::caret(9));
}

/// Transport that records what the queue hands it.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(u64, WireOperation)>>,
}

impl Transport for RecordingTransport {
    async fn send(&self, revision: u64, operation: &WireOperation) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((revision, operation.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn test_offline_typing_reaches_authority_as_one_edit() {
    let mut authority = Authority::new("hello");
    let mut local = StringBuffer::new("hello");
    let queue = OutgoingQueue::new(RecordingTransport::default());
    queue.set_online(false).await.unwrap();

    for (pos, key) in [(5, " "), (6, "w"), (7, "o")] {
        let edit = Edit::insert(pos, key);
        let op = edit.to_operation(local.len()).unwrap();
        apply_to_editor(&mut local, &op).unwrap();
        queue.enqueue(vec![edit], authority.revision()).await.unwrap();
    }
    assert_eq!(queue.outgoing_len().await, 1);

    queue.set_online(true).await.unwrap();
    let sent = queue.transport().sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (revision, message) = &sent[0];
    assert_eq!(message.trans, Edit::insert(5, " wo"));

    let op = message.trans.to_operation(authority.document().chars().count()).unwrap();
    authority.receive(*revision, op).unwrap();
    assert_eq!(authority.document(), local.text());

    let confirmed = queue.acknowledge(&message.id, authority.revision()).await.unwrap();
    assert!(confirmed.acknowledged);
    assert!(queue.pending().await.is_empty());
}

/// An authority shared by several sessions, with one event channel each.
struct Hub {
    authority: Authority,
    peers: Vec<UnboundedSender<ServerEvent>>,
}

/// Transport that hands edits straight to the hub's authority. The sender
/// gets an ack, everyone else the accepted operation.
struct HubTransport {
    hub: Arc<Mutex<Hub>>,
    peer: usize,
}

impl Transport for HubTransport {
    async fn send(&self, revision: u64, operation: &WireOperation) -> Result<(), TransportError> {
        let mut hub = self.hub.lock().unwrap();
        let accepted = hub
            .authority
            .receive_edit(revision, &operation.trans)
            .map_err(|err| TransportError::Rejected(err.to_string()))?;
        for (idx, peer) in hub.peers.iter().enumerate() {
            let event = if idx == self.peer {
                ServerEvent::Ack {
                    id: operation.id.clone(),
                }
            } else {
                ServerEvent::Remote {
                    edits: edits_from_operation(&accepted),
                }
            };
            let _ = peer.send(event);
        }
        Ok(())
    }
}

type HubSession = Session<HubTransport, StringBuffer>;

fn connect(document: &str, count: usize) -> (Arc<Mutex<Hub>>, Vec<(HubSession, UnboundedReceiver<ServerEvent>)>) {
    let hub = Arc::new(Mutex::new(Hub {
        authority: Authority::new(document),
        peers: Vec::new(),
    }));
    let sessions = (0..count)
        .map(|peer| {
            let (tx, rx) = unbounded_channel();
            hub.lock().unwrap().peers.push(tx);
            let transport = HubTransport {
                hub: Arc::clone(&hub),
                peer,
            };
            (Session::new(0, StringBuffer::new(document), transport), rx)
        })
        .collect();
    (hub, sessions)
}

/// Deliver queued server events until every channel is empty.
async fn pump(sessions: &mut [(HubSession, UnboundedReceiver<ServerEvent>)]) {
    loop {
        let mut progressed = false;
        for (session, events) in sessions.iter_mut() {
            while let Ok(event) = events.try_recv() {
                session.handle_event(event).await.unwrap();
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

fn assert_sessions_converged(hub: &Arc<Mutex<Hub>>, sessions: &[(HubSession, UnboundedReceiver<ServerEvent>)]) {
    let hub = hub.lock().unwrap();
    for (idx, (session, _)) in sessions.iter().enumerate() {
        assert_eq!(
            session.editor().text(),
            hub.authority.document(),
            "session {} diverged",
            idx
        );
        assert_eq!(session.client().state(), &SyncState::Synchronised);
        assert_eq!(session.client().revision(), hub.authority.revision());
    }
}

#[tokio::test]
async fn test_sessions_converge_through_queue() {
    let (hub, mut sessions) = connect("hello", 2);

    sessions[0]
        .0
        .local_edit(TextOperation::new().retain(5).insert(" world"))
        .await
        .unwrap();
    // Two edits in one operation, queued behind the first.
    sessions[0]
        .0
        .local_edit(TextOperation::new().delete(1).retain(10).insert("!"))
        .await
        .unwrap();
    sessions[1]
        .0
        .local_edit(TextOperation::new().delete(1).retain(4))
        .await
        .unwrap();

    pump(&mut sessions).await;

    assert_sessions_converged(&hub, &sessions);
    assert_eq!(sessions[0].0.editor().text(), "ello world!");
    assert!(sessions[0].0.queue().pending().await.is_empty());
    assert!(sessions[1].0.queue().pending().await.is_empty());
}

#[tokio::test]
async fn test_offline_session_catches_up() {
    let (hub, mut sessions) = connect("abc", 2);
    sessions[0].0.set_online(false).await.unwrap();

    sessions[0]
        .0
        .local_edit(TextOperation::new().retain(3).insert("d"))
        .await
        .unwrap();
    sessions[0]
        .0
        .local_edit(TextOperation::new().retain(4).insert("e"))
        .await
        .unwrap();
    sessions[1]
        .0
        .local_edit(TextOperation::new().insert("X").retain(3))
        .await
        .unwrap();
    assert_eq!(sessions[0].0.queue().outgoing_len().await, 1);

    pump(&mut sessions).await;
    assert_eq!(sessions[0].0.editor().text(), "Xabcde");

    sessions[0].0.set_online(true).await.unwrap();
    pump(&mut sessions).await;

    assert_sessions_converged(&hub, &sessions);
    assert_eq!(sessions[1].0.editor().text(), "Xabcde");
}

/// A random edit against a document of `len` chars.
fn random_edit(len: usize, kind: u8, pos: usize, count: usize, text: &str) -> TextOperation {
    let pos = pos % (len + 1);
    if kind % 2 == 0 || pos == len {
        insert_at(len, pos, text)
    } else {
        let count = 1 + count % (len - pos);
        delete_at(len, pos, count)
    }
}

proptest! {
    #[test]
    fn prop_random_sessions_converge(
        actions in prop::collection::vec(
            (0usize..3, 0u8..4, 0usize..32, 0usize..4, "[a-c]{1,3}"),
            1..40,
        )
    ) {
        let mut harness = CollaborationHarness::new("seed text", 3);
        for (idx, kind, pos, count, text) in actions {
            match kind {
                0 | 1 => {
                    let len = harness.clients[idx].peer.editor.len();
                    harness.edit(idx, random_edit(len, kind, pos, count, &text));
                }
                2 => harness.flush_outbox(idx),
                _ => {
                    harness.deliver_one(idx);
                }
            }
        }
        harness.run_until_quiet();

        let document = harness.authority.document().to_string();
        for idx in 0..3 {
            prop_assert_eq!(harness.text(idx), document.as_str());
        }
    }
}
