//! Per-message tracking of the two send effects.
//!
//! A sent message is published over the socket and appended to the
//! backend independently. The outbox records the outcome of each so that
//! failed appends can be retried on request and socket echoes of our own
//! messages can be recognised.

use crate::models::message::WireMessage;

/// Settled entries kept for echo matching. Unpersisted entries are kept
/// regardless until a retry succeeds.
pub const RETAINED_SETTLED: usize = 64;

/// Outcome of one send effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectState {
    /// Not attempted yet.
    Pending,
    /// Completed successfully.
    Done,
    /// Attempted and failed with the given reason.
    Failed(String),
}

impl EffectState {
    /// Build from a result.
    #[must_use]
    pub fn from_result<T, E: std::fmt::Display>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(err) => Self::Failed(err.to_string()),
        }
    }

    /// Whether the effect completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// One sent message and its effect states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Local transcript id of the message.
    pub message_id: String,
    /// Payload as sent.
    pub wire: WireMessage,
    /// Socket publish outcome.
    pub published: EffectState,
    /// Backend append outcome.
    pub persisted: EffectState,
    /// Whether the server has echoed this message back.
    pub echoed: bool,
}

/// Ordered record of sent messages for the open conversation. Replaced when
/// another conversation is opened.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    entries: Vec<OutboxEntry>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a message with both effects pending.
    pub fn track(&mut self, message_id: &str, wire: WireMessage) {
        self.entries.push(OutboxEntry {
            message_id: message_id.to_owned(),
            wire,
            published: EffectState::Pending,
            persisted: EffectState::Pending,
            echoed: false,
        });
        self.prune();
    }

    /// Record the publish outcome.
    pub fn set_published(&mut self, message_id: &str, state: EffectState) {
        if let Some(entry) = self.entry_mut(message_id) {
            entry.published = state;
        }
    }

    /// Record the append outcome.
    pub fn set_persisted(&mut self, message_id: &str, state: EffectState) {
        if let Some(entry) = self.entry_mut(message_id) {
            entry.persisted = state;
        }
    }

    /// Entry for `message_id`.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<&OutboxEntry> {
        self.entries.iter().find(|e| e.message_id == message_id)
    }

    /// Messages whose backend append has not succeeded, oldest first.
    #[must_use]
    pub fn unpersisted(&self) -> Vec<OutboxEntry> {
        self.entries
            .iter()
            .filter(|e| !e.persisted.is_done())
            .cloned()
            .collect()
    }

    /// Mark the oldest published, un-echoed entry matching `wire` as echoed.
    ///
    /// Returns `true` when `wire` is an echo of one of our own messages.
    pub fn take_echo(&mut self, wire: &WireMessage) -> bool {
        let found = self.entries.iter_mut().find(|e| {
            !e.echoed
                && e.published.is_done()
                && e.wire.from == wire.from
                && e.wire.to == wire.to
                && e.wire.content == wire.content
        });
        match found {
            Some(entry) => {
                entry.echoed = true;
                true
            }
            None => false,
        }
    }

    /// Number of tracked messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the oldest persisted entries beyond the newest
    /// [`RETAINED_SETTLED`].
    fn prune(&mut self) {
        let Some(cutoff) = self.entries.len().checked_sub(RETAINED_SETTLED) else {
            return;
        };
        let mut index = 0;
        self.entries.retain(|entry| {
            let keep = index >= cutoff || !entry.persisted.is_done();
            index += 1;
            keep
        });
    }

    fn entry_mut(&mut self, message_id: &str) -> Option<&mut OutboxEntry> {
        self.entries.iter_mut().find(|e| e.message_id == message_id)
    }
}
