//! Outbound materialization of canonical updates.
//!
//! ```text
//! outgoing:  thread_for(group address) → insert_outbox → mark_sent → Sent(thread)
//! incoming:  thread_for(group address) → base64(wire) → insert_inbox → Received(thread)
//!                                                                   ↘ Duplicate
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::core::collaborators::{HistoryStore, IncomingEntry, OutgoingEntry, ThreadStore};
use crate::core::error::CoreError;
use crate::core::types::{CanonicalUpdate, Direction, GroupEvent, ThreadId};
use crate::ds::encode_update;

/// Where a canonical update ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Materialized {
    /// Stored as a sent history entry.
    Sent(ThreadId),
    /// Stored as a new incoming history entry. The caller should notify.
    Received(ThreadId),
    /// The incoming entry was already stored.
    Duplicate,
}

impl Materialized {
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            Materialized::Sent(thread) | Materialized::Received(thread) => Some(*thread),
            Materialized::Duplicate => None,
        }
    }
}

/// Persist `update` as history for the event's direction.
///
/// # Errors
/// [`CoreError::Persistence`] if a store write fails.
pub fn materialize(
    event: &GroupEvent,
    update: &CanonicalUpdate,
    threads: &dyn ThreadStore,
    history: &dyn HistoryStore,
) -> Result<Materialized, CoreError> {
    let thread = threads.thread_for(&update.group_id.encoded())?;

    match event.direction {
        Direction::Outgoing => {
            let message = history.insert_outbox(OutgoingEntry {
                thread,
                update: update.clone(),
                timestamp: event.timestamp,
            })?;
            history.mark_sent(message)?;
            Ok(Materialized::Sent(thread))
        }
        Direction::Incoming => {
            let entry = IncomingEntry {
                thread,
                group_id: update.group_id.clone(),
                sender: event.sender.clone(),
                sender_device: event.sender_device,
                timestamp: event.timestamp,
                body: STANDARD.encode(encode_update(update)),
            };
            match history.insert_inbox(entry)? {
                Some(_) => Ok(Materialized::Received(thread)),
                None => {
                    debug!(
                        "[materialize]: duplicate {:?} from {} at {} for group {}",
                        update.kind, event.sender, event.timestamp, update.group_id
                    );
                    Ok(Materialized::Duplicate)
                }
            }
        }
    }
}
