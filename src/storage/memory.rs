//! In-memory storage implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::{
    GroupId, GroupRecord, HistoryStore, IncomingEntry, MessageId, OutgoingEntry, RosterBatch,
    RosterStore, StorageError, ThreadId, ThreadStore,
};

/// In-memory roster store.
///
/// All data is lost on restart. Use a persistent storage implementation
/// (e.g., SQLite) for production use cases.
#[derive(Default)]
pub struct MemoryRosterStore {
    records: RwLock<HashMap<GroupId, GroupRecord>>,
}

impl MemoryRosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, ordered by group id.
    pub fn records(&self) -> Result<Vec<GroupRecord>, StorageError> {
        let mut records: Vec<GroupRecord> = self
            .records
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

impl RosterStore for MemoryRosterStore {
    fn get(&self, group_id: &GroupId) -> Result<Option<GroupRecord>, StorageError> {
        Ok(self
            .records
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?
            .get(group_id)
            .cloned())
    }

    fn apply(&self, group_id: &GroupId, batch: &RosterBatch) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let existing = records.get(group_id);
        if batch.creates() && existing.is_some() {
            return Err(StorageError::Backend(format!(
                "group {group_id} already exists"
            )));
        }

        // Changes land on a copy; the map only sees the finished record.
        let next = batch
            .applied_to(existing)
            .ok_or_else(|| StorageError::NotFound(group_id.to_string()))?;
        records.insert(group_id.clone(), next);
        Ok(())
    }

    fn restore(
        &self,
        group_id: &GroupId,
        snapshot: Option<GroupRecord>,
    ) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        match snapshot {
            Some(record) => records.insert(group_id.clone(), record),
            None => records.remove(group_id),
        };
        Ok(())
    }
}

/// In-memory thread store handing out sequential thread ids.
#[derive(Default)]
pub struct MemoryThreadStore {
    threads: RwLock<HashMap<String, ThreadId>>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThreadStore for MemoryThreadStore {
    fn thread_for(&self, address: &str) -> Result<ThreadId, StorageError> {
        let mut threads = self
            .threads
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        let next = ThreadId(threads.len() as u64 + 1);
        Ok(*threads.entry(address.to_string()).or_insert(next))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredOutgoing {
    pub id: MessageId,
    pub entry: OutgoingEntry,
    pub sent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredIncoming {
    pub id: MessageId,
    pub entry: IncomingEntry,
}

#[derive(Default)]
struct History {
    next_id: u64,
    outbox: Vec<StoredOutgoing>,
    inbox: Vec<StoredIncoming>,
}

impl History {
    fn next_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId(self.next_id)
    }
}

/// In-memory history. Incoming entries are deduplicated by
/// (group, sender, timestamp) against the stored inbox.
#[derive(Default)]
pub struct MemoryHistoryStore {
    history: RwLock<History>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self) -> Result<Vec<StoredOutgoing>, StorageError> {
        Ok(self
            .history
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?
            .outbox
            .clone())
    }

    pub fn inbox(&self) -> Result<Vec<StoredIncoming>, StorageError> {
        Ok(self
            .history
            .read()
            .map_err(|e| StorageError::Lock(e.to_string()))?
            .inbox
            .clone())
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn insert_outbox(&self, entry: OutgoingEntry) -> Result<MessageId, StorageError> {
        let mut history = self
            .history
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        let id = history.next_id();
        history.outbox.push(StoredOutgoing {
            id,
            entry,
            sent: false,
        });
        Ok(id)
    }

    fn mark_sent(&self, message: MessageId) -> Result<(), StorageError> {
        let mut history = self
            .history
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        let stored = history
            .outbox
            .iter_mut()
            .find(|stored| stored.id == message)
            .ok_or_else(|| StorageError::NotFound(format!("message {}", message.0)))?;
        stored.sent = true;
        Ok(())
    }

    fn insert_inbox(&self, entry: IncomingEntry) -> Result<Option<MessageId>, StorageError> {
        let mut history = self
            .history
            .write()
            .map_err(|e| StorageError::Lock(e.to_string()))?;
        let redelivered = history.inbox.iter().rev().any(|stored| {
            stored.entry.group_id == entry.group_id
                && stored.entry.sender == entry.sender
                && stored.entry.timestamp == entry.timestamp
        });
        if redelivered {
            return Ok(None);
        }
        let id = history.next_id();
        history.inbox.push(StoredIncoming { id, entry });
        Ok(Some(id))
    }
}
