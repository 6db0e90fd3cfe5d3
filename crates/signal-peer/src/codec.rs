//! JSON encoding of [`Message`] records.
//!
//! Absent fields are omitted when encoding and unknown fields are ignored when
//! decoding, so the peer tolerates servers that attach extra metadata.

use crate::error::{PeerError, PeerResult};
use crate::message::Message;

pub fn encode(message: &Message) -> PeerResult<String> {
    serde_json::to_string(message).map_err(|err| PeerError::Encode(err.to_string()))
}

pub fn decode(raw: &str) -> PeerResult<Message> {
    serde_json::from_str(raw).map_err(|err| PeerError::Decode(err.to_string()))
}
