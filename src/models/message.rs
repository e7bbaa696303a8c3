//! Chat message models and the shared wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender identifier used by the backend for system notices.
pub const SYSTEM_SENDER: &str = "system";

/// Who authored a chat message, relative to the local driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    /// The local driver.
    Driver,
    /// The customer, merchant or support agent on the other end.
    Counterpart,
    /// Backend-generated notice.
    System,
}

/// A message in the local transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: String,
    /// Author role.
    pub sender: SenderRole,
    /// Message body.
    pub text: String,
    /// Send time.
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Construct a message authored by the local driver, stamped now.
    #[must_use]
    pub fn from_driver(text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: SenderRole::Driver,
            text,
            sent_at: Utc::now(),
        }
    }
}

/// Identifies one persisted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// Thread between the driver and the counterpart of a delivery.
    Delivery {
        /// Local driver.
        driver_id: String,
        /// Customer or merchant.
        counterpart_id: String,
    },
    /// Support thread used when no delivery is active.
    Support {
        /// Local driver.
        driver_id: String,
        /// Generated support-session identifier.
        session_id: String,
    },
}

impl ConversationKey {
    /// Open a support thread with a fresh session identifier.
    #[must_use]
    pub fn new_support(driver_id: String) -> Self {
        Self::Support {
            driver_id,
            session_id: format!("support-{}", Uuid::new_v4()),
        }
    }

    /// The local driver's identifier.
    #[must_use]
    pub fn driver_id(&self) -> &str {
        match self {
            Self::Delivery { driver_id, .. } | Self::Support { driver_id, .. } => driver_id,
        }
    }

    /// The other participant: counterpart id or support-session id.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        match self {
            Self::Delivery { counterpart_id, .. } => counterpart_id,
            Self::Support { session_id, .. } => session_id,
        }
    }
}

/// Message shape shared by the history endpoint, the send endpoint and
/// the `sendMessage` / `receiveMessage` socket events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Backend-assigned identifier, absent on outbound messages.
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender user id.
    pub from: String,
    /// Recipient user id.
    pub to: String,
    /// Message body.
    pub content: String,
    /// Send time, absent on outbound messages.
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Build an outbound message.
    #[must_use]
    pub fn outbound(from: &str, to: &str, content: &str) -> Self {
        Self {
            id: None,
            from: from.to_owned(),
            to: to.to_owned(),
            content: content.to_owned(),
            timestamp: None,
        }
    }

    /// Whether this message belongs to the conversation between `a` and `b`.
    #[must_use]
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// Convert into a transcript entry from the viewpoint of `driver_id`.
    ///
    /// Missing identifiers and timestamps are filled in locally.
    #[must_use]
    pub fn into_chat(self, driver_id: &str) -> ChatMessage {
        let sender = if self.from == driver_id {
            SenderRole::Driver
        } else if self.from == SYSTEM_SENDER {
            SenderRole::System
        } else {
            SenderRole::Counterpart
        };
        ChatMessage {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            sender,
            text: self.content,
            sent_at: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}
