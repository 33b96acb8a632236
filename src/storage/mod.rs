//! Storage backends for the reconciler's collaborators.
//!
//! This module provides in-memory implementations of the collaborator store
//! traits. Use them for development/testing, or implement the traits in
//! [`crate::core::collaborators`] for persistence.

mod memory;

pub use memory::{
    MemoryHistoryStore, MemoryRosterStore, MemoryThreadStore, StoredIncoming, StoredOutgoing,
};
