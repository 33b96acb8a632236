mod transport;

pub use transport::{decode_event, decode_update, encode_update, InboundEnvelope, OutboundPacket};
