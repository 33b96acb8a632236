//! Persisted roster snapshot and the changes reconciliation writes to it.
//!
//! # Member set arithmetic
//!
//! Reconciliation never mutates a stored member set in place. It computes
//! fresh sets with [`added`], [`missing`] and [`union`] and hands the result
//! to the store inside a [`RosterBatch`]:
//!
//! ```text
//! record {A,B}  +  event {A,B,C}
//!   added   = event - record = {C}
//!   missing = record - event = {}
//!   union   = record ∪ event = {A,B,C}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::types::{AvatarPointer, GroupId};

/// Stored state of one group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub title: Option<String>,
    pub avatar: Option<AvatarPointer>,
    pub members: BTreeSet<String>,
    /// False once the local participant has left. Kept for history.
    pub active: bool,
    /// Relay the creating event arrived through.
    pub relay: Option<String>,
}

impl GroupRecord {
    pub fn is_member(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    /// Apply one change to this snapshot.
    ///
    /// `Create` replaces the whole snapshot; the store only accepts it for an
    /// unknown group.
    pub fn apply(&mut self, change: &RosterChange) {
        match change {
            RosterChange::Create(record) => *self = record.clone(),
            RosterChange::Update { title, avatar } => {
                if let Some(title) = title {
                    self.title = Some(title.clone());
                }
                if let Some(avatar) = avatar {
                    self.avatar = Some(avatar.clone());
                }
            }
            RosterChange::UpdateMembers(members) => self.members = members.clone(),
            RosterChange::Remove(member) => {
                self.members.remove(member);
            }
            RosterChange::SetActive(active) => self.active = *active,
        }
    }
}

/// A single roster mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RosterChange {
    /// Insert a new record.
    Create(GroupRecord),
    /// Overwrite title and/or avatar. `None` leaves the stored value.
    Update {
        title: Option<String>,
        avatar: Option<AvatarPointer>,
    },
    /// Replace the member set.
    UpdateMembers(BTreeSet<String>),
    /// Drop one member.
    Remove(String),
    SetActive(bool),
}

/// Changes for one group, committed all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RosterBatch {
    changes: Vec<RosterChange>,
}

impl RosterBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: RosterChange) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[RosterChange] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether this batch inserts a new record.
    pub fn creates(&self) -> bool {
        matches!(self.changes.first(), Some(RosterChange::Create(_)))
    }

    /// Apply every change to a copy of `base` and return the result.
    ///
    /// `base` is `None` only for batches that start with `Create`.
    pub fn applied_to(&self, base: Option<&GroupRecord>) -> Option<GroupRecord> {
        let mut iter = self.changes.iter();
        let mut record = match (base, self.creates()) {
            (_, true) => match iter.next() {
                Some(RosterChange::Create(record)) => record.clone(),
                _ => return None,
            },
            (Some(base), false) => base.clone(),
            (None, false) => return None,
        };
        for change in iter {
            record.apply(change);
        }
        Some(record)
    }
}

/// Members the event names that the record does not have yet.
pub fn added(event_members: &BTreeSet<String>, record_members: &BTreeSet<String>) -> BTreeSet<String> {
    event_members.difference(record_members).cloned().collect()
}

/// Members the record has that the event's roster omits.
pub fn missing(
    event_members: &BTreeSet<String>,
    record_members: &BTreeSet<String>,
) -> BTreeSet<String> {
    record_members.difference(event_members).cloned().collect()
}

pub fn union(a: &BTreeSet<String>, b: &BTreeSet<String>) -> BTreeSet<String> {
    a.union(b).cloned().collect()
}
