//! Event classification.
//!
//! Picks the reconciliation rule for an event given the group's stored
//! record, if any:
//!
//! | record  | kind        | rule        |
//! |---------|-------------|-------------|
//! | present | Update      | Update      |
//! | absent  | Update      | Create      |
//! | present | Quit        | Leave       |
//! | present | RequestInfo | InfoRequest |
//! | *       | *           | Rejected    |

use std::fmt::Display;

use crate::core::error::CoreError;
use crate::core::roster::GroupRecord;
use crate::core::types::{EventKind, GroupEvent};

/// Reconciliation rule selected for one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    Create,
    Update(GroupRecord),
    Leave(GroupRecord),
    InfoRequest(GroupRecord),
    Rejected(RejectReason),
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Create => "create",
            Rule::Update(_) => "update",
            Rule::Leave(_) => "leave",
            Rule::InfoRequest(_) => "info_request",
            Rule::Rejected(_) => "rejected",
        }
    }
}

/// Why an event matched no rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Quit or RequestInfo for a group this device has never seen.
    UnknownGroup(EventKind),
    /// Not a control event kind.
    UnsupportedKind(EventKind),
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownGroup(kind) => write!(f, "{kind} for unknown group"),
            RejectReason::UnsupportedKind(kind) => write!(f, "unsupported kind {kind}"),
        }
    }
}

impl From<RejectReason> for CoreError {
    fn from(reason: RejectReason) -> Self {
        CoreError::UnknownEventShape(reason.to_string())
    }
}

/// Boundary check run before any store access.
pub fn validate(event: &GroupEvent) -> Result<(), CoreError> {
    if event.group_id.is_empty() {
        return Err(CoreError::InvalidEvent(format!(
            "{} event from {} has no group id",
            event.kind, event.sender
        )));
    }
    Ok(())
}

pub fn classify(event: &GroupEvent, record: Option<GroupRecord>) -> Rule {
    match (record, event.kind) {
        (Some(record), EventKind::Update) => Rule::Update(record),
        (None, EventKind::Update) => Rule::Create,
        (Some(record), EventKind::Quit) => Rule::Leave(record),
        (Some(record), EventKind::RequestInfo) => Rule::InfoRequest(record),
        (None, kind @ (EventKind::Quit | EventKind::RequestInfo)) => {
            Rule::Rejected(RejectReason::UnknownGroup(kind))
        }
        (_, kind @ (EventKind::Deliver | EventKind::Unknown)) => {
            Rule::Rejected(RejectReason::UnsupportedKind(kind))
        }
    }
}
