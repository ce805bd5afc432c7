//! JSON text framing for fbws.
//!
//! Wire format: one JSON object per transport message, no length prefix.

use crate::error::{FbwsError, FbwsResult};
use crate::messages::Message;

/// Encode a message into a text frame.
pub fn encode(msg: &Message) -> FbwsResult<String> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a text frame.
///
/// Anything that is not a JSON object of a known shape is rejected; callers
/// drop such frames without surfacing an error to the peer.
pub fn decode(text: &str) -> FbwsResult<Message> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(FbwsError::InvalidMessage("frame is not a JSON object".into()));
    }
    Ok(serde_json::from_value(value)?)
}
