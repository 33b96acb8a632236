//! Reconciliation rules.
//!
//! Each rule is a pure function of the event and the stored record. It
//! returns the roster batch to commit, the canonical update to materialize
//! and the side effects to schedule; the caller does all I/O.
//!
//! # Rules
//!
//! - **Create**: insert a record with the event's roster, name and avatar.
//!   The canonical update carries every member.
//! - **Update**: grow the roster to `record ∪ event`, never shrink it. The
//!   canonical update carries only the added members. Name/avatar present in
//!   the event overwrite the stored ones. Reactivates inactive records.
//! - **Leave**: drop the sender from the roster. A local outgoing Quit also
//!   deactivates the record.
//! - **InfoRequest**: schedule a full roster push back to the requester.

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::classify::Rule;
use crate::core::effects::SideEffect;
use crate::core::error::CoreError;
use crate::core::roster::{added, missing, union, GroupRecord, RosterBatch, RosterChange};
use crate::core::types::{CanonicalUpdate, GroupEvent, UpdateKind};

/// Result of applying a rule to one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Roster changes to commit and a canonical update to materialize.
    Changed(Reconciliation),
    /// Read-only: nothing to persist, only follow-up work.
    ScheduleOnly(Vec<SideEffect>),
    /// Leave or info request from someone not in the roster.
    StaleSenderNotMember(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub batch: RosterBatch,
    pub update: CanonicalUpdate,
    pub effects: Vec<SideEffect>,
    /// Stored members the event's roster omitted. Reported, never evicted.
    pub missing: BTreeSet<String>,
}

impl Reconciliation {
    fn new(event: &GroupEvent, batch: RosterBatch, update: CanonicalUpdate) -> Self {
        let effects = event
            .avatar
            .clone()
            .map(|pointer| SideEffect::FetchAvatar {
                group_id: event.group_id.clone(),
                pointer,
            })
            .into_iter()
            .collect();
        Self {
            batch,
            update,
            effects,
            missing: BTreeSet::new(),
        }
    }
}

/// Apply `rule` to `event`.
///
/// # Errors
/// [`CoreError::UnknownEventShape`] when the classifier rejected the event.
pub fn reconcile(event: &GroupEvent, rule: Rule) -> Result<ReconcileResult, CoreError> {
    match rule {
        Rule::Create => Ok(ReconcileResult::Changed(create(event))),
        Rule::Update(record) => Ok(ReconcileResult::Changed(update(event, &record))),
        Rule::Leave(record) => Ok(leave(event, &record)),
        Rule::InfoRequest(record) => Ok(info_request(event, record)),
        Rule::Rejected(reason) => Err(reason.into()),
    }
}

fn create(event: &GroupEvent) -> Reconciliation {
    let members = event.member_set();

    let mut batch = RosterBatch::new();
    batch.push(RosterChange::Create(GroupRecord {
        id: event.group_id.clone(),
        title: event.name.clone(),
        avatar: event.avatar.clone(),
        members: members.clone(),
        active: true,
        relay: event.relay.clone(),
    }));

    let update = CanonicalUpdate {
        group_id: event.group_id.clone(),
        kind: UpdateKind::Update,
        name: event.name.clone(),
        avatar: event.avatar.clone(),
        members: members.into_iter().collect(),
    };

    Reconciliation::new(event, batch, update)
}

fn update(event: &GroupEvent, record: &GroupRecord) -> Reconciliation {
    let event_members = event.member_set();
    let added = added(&event_members, &record.members);
    let missing = missing(&event_members, &record.members);

    let mut batch = RosterBatch::new();
    let mut update = CanonicalUpdate {
        group_id: event.group_id.clone(),
        kind: UpdateKind::Update,
        name: event.name.clone(),
        avatar: event.avatar.clone(),
        members: Vec::new(),
    };

    if !added.is_empty() {
        batch.push(RosterChange::UpdateMembers(union(
            &record.members,
            &event_members,
        )));
        update.members = added.into_iter().collect();
    }

    if !missing.is_empty() {
        debug!(
            "[update]: group {} roster from {} omits {} stored member(s); keeping them",
            event.group_id,
            event.sender,
            missing.len()
        );
    }

    if event.name.is_some() || event.avatar.is_some() {
        batch.push(RosterChange::Update {
            title: event.name.clone(),
            avatar: event.avatar.clone(),
        });
    }

    if event.name.is_some() && event.name == record.title {
        update.name = None;
    }

    if !record.active {
        batch.push(RosterChange::SetActive(true));
    }

    let mut reconciliation = Reconciliation::new(event, batch, update);
    reconciliation.missing = missing;
    reconciliation
}

fn leave(event: &GroupEvent, record: &GroupRecord) -> ReconcileResult {
    if !record.is_member(&event.sender) {
        return ReconcileResult::StaleSenderNotMember(event.sender.clone());
    }

    let mut batch = RosterBatch::new();
    batch.push(RosterChange::Remove(event.sender.clone()));
    if event.direction.is_outgoing() {
        batch.push(RosterChange::SetActive(false));
    }

    let update = CanonicalUpdate::new(event.group_id.clone(), UpdateKind::Quit);
    ReconcileResult::Changed(Reconciliation::new(event, batch, update))
}

fn info_request(event: &GroupEvent, record: GroupRecord) -> ReconcileResult {
    if !record.is_member(&event.sender) {
        return ReconcileResult::StaleSenderNotMember(event.sender.clone());
    }

    ReconcileResult::ScheduleOnly(vec![SideEffect::PushRoster {
        recipient: event.sender.clone(),
        record,
    }])
}
