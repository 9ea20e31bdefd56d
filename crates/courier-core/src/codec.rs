//! JSON text codec for the courier wire protocol.
//!
//! Wire format: one JSON object per WebSocket text message.

use crate::error::{CourierError, CourierResult};
use crate::frame::Frame;

/// Largest inbound text frame accepted by default (64 KiB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Encode a serializable value into its compact JSON text form.
pub fn encode<T: serde::Serialize>(value: &T) -> CourierResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode one inbound chat frame, rejecting oversized input before parsing.
pub fn decode_frame(text: &str, max_bytes: usize) -> CourierResult<Frame> {
    if text.len() > max_bytes {
        return Err(CourierError::InvalidFrame(format!(
            "frame too large: {} bytes (max {})",
            text.len(),
            max_bytes
        )));
    }
    Ok(serde_json::from_str(text)?)
}
