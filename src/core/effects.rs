//! Follow-up work scheduled by reconciliation.

use tokio_util::sync::CancellationToken;

use crate::core::roster::GroupRecord;
use crate::core::types::{AvatarPointer, CanonicalUpdate, GroupId, UpdateKind};

/// Fire-and-forget work that must not block reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SideEffect {
    /// Download the avatar payload behind a pointer.
    FetchAvatar {
        group_id: GroupId,
        pointer: AvatarPointer,
    },
    /// Send the full current roster to a member who asked for it.
    PushRoster {
        recipient: String,
        record: GroupRecord,
    },
}

impl SideEffect {
    pub fn group_id(&self) -> &GroupId {
        match self {
            SideEffect::FetchAvatar { group_id, .. } => group_id,
            SideEffect::PushRoster { record, .. } => &record.id,
        }
    }
}

/// Full-roster update answering an info request.
pub fn roster_snapshot(record: &GroupRecord) -> CanonicalUpdate {
    CanonicalUpdate {
        group_id: record.id.clone(),
        kind: UpdateKind::Update,
        name: record.title.clone(),
        avatar: record.avatar.clone(),
        members: record.members.iter().cloned().collect(),
    }
}

/// A side effect handed to a [`TaskRunner`](crate::core::TaskRunner).
///
/// The token is cancelled when a later effect for the same target supersedes
/// this one, and by the runner once the task has finished.
#[derive(Clone, Debug)]
pub struct Task {
    pub effect: SideEffect,
    pub token: CancellationToken,
}

impl Task {
    pub fn new(effect: SideEffect) -> Self {
        Self {
            effect,
            token: CancellationToken::new(),
        }
    }
}
