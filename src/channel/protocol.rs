//! JSON frames exchanged over the messaging socket.
//!
//! Every frame is a text message `{"event": <name>, "data": <payload>}`.
//!
//! | Event            | Direction | Payload                      |
//! |------------------|-----------|------------------------------|
//! | `join`           | outbound  | driver id (string)           |
//! | `sendMessage`    | outbound  | [`WireMessage`]              |
//! | `receiveMessage` | inbound   | [`WireMessage`]              |
//! | *(any other)*    | inbound   | skipped; logged at `DEBUG`   |

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::message::WireMessage;
use crate::{AppError, Result};

/// Frame sent from the driver to the messaging server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundFrame {
    /// Join the room keyed by the driver id.
    #[serde(rename = "join")]
    Join(String),
    /// Publish a chat message.
    #[serde(rename = "sendMessage")]
    SendMessage(WireMessage),
}

impl OutboundFrame {
    /// Serialise to the socket text payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Malformed` if serialisation fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse one inbound text frame.
///
/// - `Ok(Some(message))` for `receiveMessage`;
/// - `Ok(None)` for empty frames and unknown events;
/// - `Err(AppError::Channel)` for invalid JSON or a bad payload.
///
/// # Errors
///
/// See above.
pub fn parse_inbound_frame(text: &str) -> Result<Option<WireMessage>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let envelope: InboundEnvelope = serde_json::from_str(text)
        .map_err(|e| AppError::Channel(format!("malformed frame: {e}")))?;

    match envelope.event.as_str() {
        "receiveMessage" => serde_json::from_value(envelope.data)
            .map(Some)
            .map_err(|e| AppError::Channel(format!("bad receiveMessage payload: {e}"))),
        other => {
            debug!(event = other, "skipping unknown inbound event");
            Ok(None)
        }
    }
}
