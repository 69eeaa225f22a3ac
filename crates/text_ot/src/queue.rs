//! Outgoing operation queue.
//!
//! The queue serializes a client's local edits to the authority with at most
//! one edit in flight at a time. Edits wait in `outgoing` until the previous
//! one is acknowledged; while they wait, adjacent edits are folded together
//! so that bursts of typing or deleting travel as a single message.
//!
//! Both collections sit behind their own async mutex. The ack path and the
//! local-edit path may interleave on the event loop, and every mutation goes
//! through one of the guards. Guards are always taken in the order
//! `awaiting_ack` then `outgoing`, and never held across a send.
//!
//! When the queue is offline, edits keep accumulating (and merging) locally
//! and dispatch resumes from the head of `outgoing` once it comes back
//! online.

use crate::error::{OtError, OtResult, TransportError};
use crate::wire::{Edit, WireOperation};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Network collaborator that carries operations to the authority.
#[trait_variant::make(Send)]
pub trait Transport: Send + Sync {
    /// Deliver `operation`, generated against `revision`.
    ///
    /// Returns once the message has been handed to the network; the
    /// authority's acknowledgment arrives separately.
    async fn send(&self, revision: u64, operation: &WireOperation) -> Result<(), TransportError>;
}

/// Configuration for the outgoing queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Fold adjacent undispatched edits together.
    pub merge_edits: bool,
    /// Largest insert or delete, in chars, that merging may produce.
    pub max_merged_chars: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            merge_edits: true,
            max_merged_chars: 4096,
        }
    }
}

impl QueueConfig {
    /// A configuration that never merges edits.
    pub fn without_merging() -> Self {
        Self {
            merge_edits: false,
            ..Default::default()
        }
    }

    /// Create a configuration with the specified merge limit.
    pub fn with_max_merged_chars(max_merged_chars: usize) -> Self {
        Self {
            max_merged_chars,
            ..Default::default()
        }
    }
}

/// A local edit on its way to the authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub edit: Edit,
    /// Revision the edit was made against.
    pub revision: u64,
    pub acknowledged: bool,
}

impl PendingOperation {
    /// Create a record with a fresh id.
    pub fn new(edit: Edit, revision: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            edit,
            revision,
            acknowledged: false,
        }
    }

    fn to_wire(&self) -> WireOperation {
        WireOperation::with_id(self.id.clone(), self.edit.clone())
    }
}

/// Result of folding two consecutive edits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Merged {
    /// The pair is equivalent to one edit.
    One(Edit),
    /// The pair has no net effect.
    Cancelled,
}

/// Fold `second`, made right after `first`, into a single edit if possible.
pub fn merge_edits(first: &Edit, second: &Edit, max_chars: usize) -> Option<Merged> {
    match (first, second) {
        (Edit::Insert { pos: p, content: a }, Edit::Insert { pos: q, content: b }) => {
            let a_len = a.chars().count();
            let b_len = b.chars().count();
            if *q < *p || *q > p.checked_add(a_len)? || a_len + b_len > max_chars {
                return None;
            }
            let split = q - p;
            let mut content: String = a.chars().take(split).collect();
            content.push_str(b);
            content.extend(a.chars().skip(split));
            Some(Merged::One(Edit::insert(*p, content)))
        }
        (Edit::Delete { pos: p, length: n }, Edit::Delete { pos: q, length: m }) => {
            let total = n.checked_add(*m)?;
            if total > max_chars {
                return None;
            }
            if q == p {
                // Forward delete.
                Some(Merged::One(Edit::delete(*p, total)))
            } else if q.checked_add(*m)? == *p {
                // Backspace.
                Some(Merged::One(Edit::delete(*q, total)))
            } else {
                None
            }
        }
        (Edit::Insert { pos: p, content: a }, Edit::Delete { pos: q, length: m }) => {
            let a_len = a.chars().count();
            let insert_end = p.checked_add(a_len)?;
            let delete_end = q.checked_add(*m)?;
            if *q <= *p && delete_end >= insert_end {
                // The delete swallows the whole insert.
                let rest = m - a_len;
                if rest == 0 {
                    Some(Merged::Cancelled)
                } else {
                    Some(Merged::One(Edit::delete(*q, rest)))
                }
            } else if *q >= *p && delete_end <= insert_end {
                let start = q - p;
                let content: String = a
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| *i < start || *i >= start + m)
                    .map(|(_, c)| c)
                    .collect();
                Some(Merged::One(Edit::insert(*p, content)))
            } else {
                None
            }
        }
        (Edit::Delete { .. }, Edit::Insert { .. }) => None,
    }
}

/// Fold adjacent records of `queue` in place.
///
/// Only records made against the same revision are folded.
fn merge_pending(queue: &mut VecDeque<PendingOperation>, max_chars: usize) {
    let mut merged: VecDeque<PendingOperation> = VecDeque::with_capacity(queue.len());
    for next in queue.drain(..) {
        let action = merged
            .back()
            .filter(|prev| prev.revision == next.revision)
            .and_then(|prev| merge_edits(&prev.edit, &next.edit, max_chars));
        match action {
            Some(Merged::One(edit)) => {
                if let Some(prev) = merged.back_mut() {
                    tracing::debug!("Merged queued operation {} into {}", next.id, prev.id);
                    prev.edit = edit;
                }
            }
            Some(Merged::Cancelled) => {
                if let Some(prev) = merged.pop_back() {
                    tracing::debug!("Queued operations {} and {} cancel out", prev.id, next.id);
                }
            }
            None => merged.push_back(next),
        }
    }
    *queue = merged;
}

/// Serializes local edits to the authority, one in flight at a time.
pub struct OutgoingQueue<T: Transport> {
    transport: T,
    config: QueueConfig,
    /// Edits not yet dispatched.
    outgoing: Mutex<VecDeque<PendingOperation>>,
    /// Edits dispatched and not yet acknowledged (at most one).
    awaiting_ack: Mutex<VecDeque<PendingOperation>>,
    online: AtomicBool,
}

impl<T: Transport> OutgoingQueue<T> {
    /// Create an online queue with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, QueueConfig::default())
    }

    pub fn with_config(transport: T, config: QueueConfig) -> Self {
        Self {
            transport,
            config,
            outgoing: Mutex::new(VecDeque::new()),
            awaiting_ack: Mutex::new(VecDeque::new()),
            online: AtomicBool::new(true),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Queue local edits made against `revision` and dispatch if idle.
    ///
    /// A transport failure is returned but leaves every edit queued; the
    /// queue goes offline until [`OutgoingQueue::set_online`] is called.
    pub async fn enqueue(&self, edits: Vec<Edit>, revision: u64) -> OtResult<()> {
        {
            let mut outgoing = self.outgoing.lock().await;
            outgoing.extend(
                edits
                    .into_iter()
                    .filter(|edit| !edit.is_empty())
                    .map(|edit| PendingOperation::new(edit, revision)),
            );
            if self.config.merge_edits {
                merge_pending(&mut outgoing, self.config.max_merged_chars);
            }
        }
        self.dispatch_next().await
    }

    /// Confirm the in-flight edit `id`, accepted by the authority as
    /// `revision`, and dispatch the next one.
    ///
    /// The next queued edit was made on a document that already contains the
    /// confirmed one, so it is restamped with `revision` before it goes out.
    /// Returns the confirmed record. Failing to dispatch the next edit does
    /// not fail the acknowledgment; it only takes the queue offline.
    pub async fn acknowledge(&self, id: &str, revision: u64) -> OtResult<PendingOperation> {
        let mut record = {
            let mut awaiting = self.awaiting_ack.lock().await;
            let index = awaiting
                .iter()
                .position(|pending| pending.id == id)
                .ok_or_else(|| OtError::UnknownAcknowledgment(id.to_string()))?;
            let record = awaiting
                .remove(index)
                .ok_or_else(|| OtError::UnknownAcknowledgment(id.to_string()))?;

            let mut outgoing = self.outgoing.lock().await;
            if let Some(next) = outgoing.front_mut() {
                if next.revision < revision {
                    tracing::debug!(
                        "Restamping operation {} from revision {} to {}",
                        next.id,
                        next.revision,
                        revision
                    );
                    next.revision = revision;
                }
            }
            record
        };
        record.acknowledged = true;
        tracing::debug!("Operation {} acknowledged as revision {}", record.id, revision);

        if let Err(err) = self.dispatch_next().await {
            tracing::warn!("Dispatch after acknowledgment failed: {}", err);
        }
        Ok(record)
    }

    /// Change connectivity. Going online resumes dispatch.
    pub async fn set_online(&self, online: bool) -> OtResult<()> {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            tracing::info!("Outgoing queue is now {}", if online { "online" } else { "offline" });
        }
        if online {
            self.dispatch_next().await?;
        }
        Ok(())
    }

    /// Send the in-flight edit again, e.g. after an ack timeout.
    pub async fn resend(&self) -> OtResult<()> {
        if !self.is_online() {
            return Ok(());
        }
        let in_flight = self.awaiting_ack.lock().await.front().cloned();
        match in_flight {
            Some(pending) => self.send(pending).await,
            None => Ok(()),
        }
    }

    /// The edit currently awaiting acknowledgment.
    pub async fn in_flight(&self) -> Option<PendingOperation> {
        self.awaiting_ack.lock().await.front().cloned()
    }

    pub async fn outgoing_len(&self) -> usize {
        self.outgoing.lock().await.len()
    }

    pub async fn awaiting_len(&self) -> usize {
        self.awaiting_ack.lock().await.len()
    }

    /// Snapshot of every unconfirmed edit, in-flight first.
    pub async fn pending(&self) -> Vec<PendingOperation> {
        let awaiting = self.awaiting_ack.lock().await;
        let outgoing = self.outgoing.lock().await;
        awaiting.iter().chain(outgoing.iter()).cloned().collect()
    }

    /// Move the next edit into flight if nothing else is.
    async fn dispatch_next(&self) -> OtResult<()> {
        if !self.is_online() {
            return Ok(());
        }
        let next = {
            let mut awaiting = self.awaiting_ack.lock().await;
            if !awaiting.is_empty() {
                return Ok(());
            }
            let mut outgoing = self.outgoing.lock().await;
            match outgoing.pop_front() {
                Some(next) => {
                    awaiting.push_back(next.clone());
                    next
                }
                None => return Ok(()),
            }
        };
        self.send(next).await
    }

    async fn send(&self, pending: PendingOperation) -> OtResult<()> {
        tracing::debug!(
            "Dispatching operation {} at revision {}",
            pending.id,
            pending.revision
        );
        let message = pending.to_wire();
        match self.transport.send(pending.revision, &message).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!("Failed to send operation {}: {}; going offline", pending.id, err);
                self.online.store(false, Ordering::SeqCst);

                let mut awaiting = self.awaiting_ack.lock().await;
                if let Some(index) = awaiting.iter().position(|p| p.id == pending.id) {
                    if let Some(record) = awaiting.remove(index) {
                        self.outgoing.lock().await.push_front(record);
                    }
                }
                Err(err.into())
            }
        }
    }
}
