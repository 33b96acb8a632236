//! Core types for group control events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

use crate::protos::groups::v1::{group_context, AttachmentPointer, GroupContext};

/// Prefix of the synthetic address a group's conversation thread is keyed by.
pub const GROUP_ADDRESS_PREFIX: &str = "__textsecure_group__!";

/// Opaque group identifier, stable for the group's lifetime on every device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(#[serde(with = "hex::serde")] Vec<u8>);

impl GroupId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Synthetic address used to resolve the group's conversation thread.
    pub fn encoded(&self) -> String {
        format!("{GROUP_ADDRESS_PREFIX}{}", hex::encode(&self.0))
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl From<&[u8]> for GroupId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Kind of control event as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Create-flavoured update: creates the group when unknown locally.
    Update,
    Quit,
    RequestInfo,
    /// Plain delivery context. Not a control event.
    Deliver,
    Unknown,
}

impl From<group_context::Type> for EventKind {
    fn from(value: group_context::Type) -> Self {
        match value {
            group_context::Type::Update => EventKind::Update,
            group_context::Type::Quit => EventKind::Quit,
            group_context::Type::RequestInfo => EventKind::RequestInfo,
            group_context::Type::Deliver => EventKind::Deliver,
            group_context::Type::Unknown => EventKind::Unknown,
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Update => "update",
            EventKind::Quit => "quit",
            EventKind::RequestInfo => "request_info",
            EventKind::Deliver => "deliver",
            EventKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Whether the event was received from a peer or originated on this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Direction::Outgoing)
    }
}

/// Reference to a group avatar held by the attachment service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarPointer {
    pub id: u64,
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
    pub content_type: Option<String>,
}

impl From<AttachmentPointer> for AvatarPointer {
    fn from(pointer: AttachmentPointer) -> Self {
        Self {
            id: pointer.id,
            key: pointer.key,
            content_type: pointer.content_type,
        }
    }
}

impl From<&AvatarPointer> for AttachmentPointer {
    fn from(pointer: &AvatarPointer) -> Self {
        Self {
            id: pointer.id,
            content_type: pointer.content_type.clone(),
            key: pointer.key.clone(),
        }
    }
}

/// An authenticated, decoded group control event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupEvent {
    pub group_id: GroupId,
    pub kind: EventKind,
    pub name: Option<String>,
    pub avatar: Option<AvatarPointer>,
    /// Full target roster as the sender sees it, if the event carries one.
    pub members: Option<Vec<String>>,
    pub sender: String,
    pub sender_device: u32,
    /// Transport relay the event arrived through.
    pub relay: Option<String>,
    pub timestamp: u64,
    pub direction: Direction,
}

impl GroupEvent {
    /// Event members as a set. An absent list is an empty target set.
    pub fn member_set(&self) -> BTreeSet<String> {
        self.members
            .as_ref()
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Kind tag of a [`CanonicalUpdate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Update,
    Quit,
    RequestInfo,
}

impl From<UpdateKind> for group_context::Type {
    fn from(kind: UpdateKind) -> Self {
        match kind {
            UpdateKind::Update => group_context::Type::Update,
            UpdateKind::Quit => group_context::Type::Quit,
            UpdateKind::RequestInfo => group_context::Type::RequestInfo,
        }
    }
}

/// The incremental change produced by reconciliation.
///
/// `members` holds only the members this update adds, never the full roster,
/// except for a Create where every member is new.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUpdate {
    pub group_id: GroupId,
    pub kind: UpdateKind,
    pub name: Option<String>,
    pub avatar: Option<AvatarPointer>,
    pub members: Vec<String>,
}

impl CanonicalUpdate {
    pub fn new(group_id: GroupId, kind: UpdateKind) -> Self {
        Self {
            group_id,
            kind,
            name: None,
            avatar: None,
            members: Vec::new(),
        }
    }
}

impl From<&CanonicalUpdate> for GroupContext {
    fn from(update: &CanonicalUpdate) -> Self {
        GroupContext {
            id: update.group_id.as_bytes().to_vec(),
            r#type: group_context::Type::from(update.kind) as i32,
            name: update.name.clone(),
            members: update.members.clone(),
            avatar: update.avatar.as_ref().map(AttachmentPointer::from),
        }
    }
}

/// Identifier of a conversation thread in the thread store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u64);

impl Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a history entry in the history store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);
