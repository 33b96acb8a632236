//! Collaborator interfaces the reconciler is wired to.
//!
//! Stores are synchronous and called while the group's lock is held. The
//! notifier is async and only called after the lock is released.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. Internal synchronization (locks,
//! channels) is the implementation's responsibility.

use async_trait::async_trait;

use crate::core::effects::Task;
use crate::core::error::StorageError;
use crate::core::roster::{GroupRecord, RosterBatch};
use crate::core::types::{CanonicalUpdate, GroupId, MessageId, ThreadId};

/// Keyed record store holding one [`GroupRecord`] per group.
pub trait RosterStore: Send + Sync + 'static {
    fn get(&self, group_id: &GroupId) -> Result<Option<GroupRecord>, StorageError>;

    /// Commit every change in `batch` or none of them.
    ///
    /// A batch starting with `Create` must fail if the record already exists;
    /// any other batch must fail if it does not.
    fn apply(&self, group_id: &GroupId, batch: &RosterBatch) -> Result<(), StorageError>;

    /// Overwrite the stored record with `snapshot`; `None` removes it.
    fn restore(&self, group_id: &GroupId, snapshot: Option<GroupRecord>)
        -> Result<(), StorageError>;
}

/// Conversation threads keyed by address.
pub trait ThreadStore: Send + Sync + 'static {
    /// Resolve the thread for `address`, creating it when missing.
    fn thread_for(&self, address: &str) -> Result<ThreadId, StorageError>;
}

/// A locally originated control message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEntry {
    pub thread: ThreadId,
    pub update: CanonicalUpdate,
    pub timestamp: u64,
}

/// A control message received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingEntry {
    pub thread: ThreadId,
    pub group_id: GroupId,
    pub sender: String,
    pub sender_device: u32,
    pub timestamp: u64,
    /// Base64 of the encoded wire payload.
    pub body: String,
}

/// Conversation history for group control messages.
pub trait HistoryStore: Send + Sync + 'static {
    fn insert_outbox(&self, entry: OutgoingEntry) -> Result<MessageId, StorageError>;

    /// Mark an outbox entry as sent, pending delivery confirmation.
    fn mark_sent(&self, message: MessageId) -> Result<(), StorageError>;

    /// Insert into the inbox. `Ok(None)` means the entry was already there.
    fn insert_inbox(&self, entry: IncomingEntry) -> Result<Option<MessageId>, StorageError>;
}

/// User-facing notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called once per newly stored incoming control message.
    async fn notify(&self, thread: ThreadId);
}

/// Background executor for side effects.
///
/// `enqueue` must return immediately; the task runs later, off the caller's
/// path, and is skipped if its token is cancelled before it starts.
pub trait TaskRunner: Send + Sync + 'static {
    fn enqueue(&self, task: Task);
}
