//! Core library for group control reconciliation.
//!
//! This module holds the synchronous building blocks: classification, the
//! reconciliation rules and materialization. Nothing here spawns tasks or
//! locks; [`crate::app`] sequences these calls per group.
//!
//! # Flow
//!
//! ```text
//! validate(event)
//!   → classify(event, store.get(id))          → Rule
//!   → reconcile(event, rule)                  → ReconcileResult
//!   → store.apply(id, batch)                  (all-or-nothing)
//!   → materialize(event, update, threads, history) → Materialized
//!   → side effects handed to the dispatcher
//! ```

pub mod classify;
pub mod collaborators;
pub mod effects;
mod error;
pub mod materialize;
pub mod reconcile;
pub mod roster;
mod types;

pub use classify::{classify, validate, RejectReason, Rule};
pub use collaborators::{
    HistoryStore, IncomingEntry, Notifier, OutgoingEntry, RosterStore, TaskRunner, ThreadStore,
};
pub use effects::{roster_snapshot, SideEffect, Task};
pub use error::{CoreError, StorageError};
pub use materialize::{materialize, Materialized};
pub use reconcile::{reconcile, ReconcileResult, Reconciliation};
pub use roster::{GroupRecord, RosterBatch, RosterChange};
pub use types::{
    AvatarPointer, CanonicalUpdate, Direction, EventKind, GroupEvent, GroupId, MessageId,
    ThreadId, UpdateKind, GROUP_ADDRESS_PREFIX,
};
