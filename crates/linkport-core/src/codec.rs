//! Payload formatting between strings and wire bytes
//!
//! No framing is applied: bytes pass through unchanged apart from the
//! optional hex mapping.

use crate::config::PayloadFormat;
use crate::error::{LinkError, LinkResult};

/// Turn an outgoing string into wire bytes
///
/// In hex mode whitespace is ignored, so `"0a 1B"` and `"0A1b"` encode the
/// same two bytes.
pub fn encode_outgoing(data: &str, format: PayloadFormat) -> LinkResult<Vec<u8>> {
    match format {
        PayloadFormat::Text => Ok(data.as_bytes().to_vec()),
        PayloadFormat::Hex => {
            let digits: String = data.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(&digits).map_err(|e| LinkError::InvalidPayload(format!("{}: {:?}", e, data)))
        }
    }
}

/// Render received bytes for observers
pub fn render_incoming(payload: &[u8], format: PayloadFormat) -> String {
    match format {
        PayloadFormat::Text => String::from_utf8_lossy(payload).into_owned(),
        PayloadFormat::Hex => payload
            .iter()
            .map(|byte| hex::encode_upper([*byte]))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
