//! Transport-agnostic envelopes and the group control wire codec.
use prost::Message;

use crate::core::{
    effects::roster_snapshot, CanonicalUpdate, CoreError, Direction, EventKind, GroupEvent,
    GroupId, GroupRecord, UpdateKind,
};
use crate::protos::groups::v1::{group_context, GroupContext};

/// An authenticated envelope delivered by the transport, payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub source: String,
    pub source_device: u32,
    pub timestamp: u64,
    /// Relay the envelope arrived through, if any.
    pub relay: Option<String>,
    /// Encoded [`GroupContext`].
    pub payload: Vec<u8>,
}

impl InboundEnvelope {
    pub fn new(source: &str, source_device: u32, timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            source: source.to_string(),
            source_device,
            timestamp,
            relay: None,
            payload,
        }
    }

    pub fn with_relay(mut self, relay: &str) -> Self {
        self.relay = Some(relay.to_string());
        self
    }
}

/// A packet that should be sent to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub recipient: String,
    pub group_id: GroupId,
    pub payload: Vec<u8>,
}

impl OutboundPacket {
    pub fn new(recipient: &str, group_id: GroupId, payload: Vec<u8>) -> Self {
        Self {
            recipient: recipient.to_string(),
            group_id,
            payload,
        }
    }

    /// Full roster of `record` addressed to `recipient`.
    pub fn roster_push(recipient: &str, record: &GroupRecord) -> Self {
        Self::new(
            recipient,
            record.id.clone(),
            encode_update(&roster_snapshot(record)),
        )
    }
}

/// Decode the control event carried by `envelope`.
///
/// # Errors
/// - [`CoreError::Message`] if the payload is not a `GroupContext`
/// - [`CoreError::InvalidEvent`] if it carries no group id
pub fn decode_event(envelope: &InboundEnvelope, direction: Direction) -> Result<GroupEvent, CoreError> {
    let context = GroupContext::decode(envelope.payload.as_slice())?;
    if context.id.is_empty() {
        return Err(CoreError::InvalidEvent(format!(
            "group context from {} has no id",
            envelope.source
        )));
    }

    let kind = group_context::Type::try_from(context.r#type)
        .map(EventKind::from)
        .unwrap_or(EventKind::Unknown);
    // Repeated fields cannot be absent on the wire; no members means no roster.
    let members = (!context.members.is_empty()).then_some(context.members);

    Ok(GroupEvent {
        group_id: GroupId::new(context.id),
        kind,
        name: context.name,
        avatar: context.avatar.map(Into::into),
        members,
        sender: envelope.source.clone(),
        sender_device: envelope.source_device,
        relay: envelope.relay.clone(),
        timestamp: envelope.timestamp,
        direction,
    })
}

pub fn encode_update(update: &CanonicalUpdate) -> Vec<u8> {
    GroupContext::from(update).encode_to_vec()
}

/// Decode a canonical update previously produced by [`encode_update`].
pub fn decode_update(payload: &[u8]) -> Result<CanonicalUpdate, CoreError> {
    let context = GroupContext::decode(payload)?;
    let kind = match group_context::Type::try_from(context.r#type) {
        Ok(group_context::Type::Update) => UpdateKind::Update,
        Ok(group_context::Type::Quit) => UpdateKind::Quit,
        Ok(group_context::Type::RequestInfo) => UpdateKind::RequestInfo,
        _ => {
            return Err(CoreError::UnknownEventShape(format!(
                "wire type {} is not a canonical update",
                context.r#type
            )))
        }
    };

    Ok(CanonicalUpdate {
        group_id: GroupId::new(context.id),
        kind,
        name: context.name,
        avatar: context.avatar.map(Into::into),
        members: context.members,
    })
}
