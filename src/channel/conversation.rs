//! The open conversation: transcript, history load, send and receive.
//!
//! Sending is optimistic. The message is appended to the transcript first,
//! then published and persisted as two independent effects whose outcomes
//! are tracked in the [`Outbox`]. A failed append is logged, never
//! surfaced as a send failure, and can be retried with
//! [`MessagingChannel::retry_unpersisted`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::outbox::{EffectState, Outbox};
use crate::channel::protocol::OutboundFrame;
use crate::channel::{ChannelTransport, MessageStore};
use crate::models::message::{ChatMessage, ConversationKey, WireMessage};
use crate::{AppError, Result};

/// Outcome of [`MessagingChannel::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Message as appended to the transcript.
    pub message: ChatMessage,
    /// Socket publish outcome.
    pub published: EffectState,
    /// Backend append outcome.
    pub persisted: EffectState,
}

/// Outcome of [`MessagingChannel::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOutcome {
    /// Converted message.
    pub message: ChatMessage,
    /// Whether it was appended to the open transcript.
    pub appended: bool,
    /// Whether the UI should raise a toast (sender is not the driver).
    pub alert: bool,
}

struct OpenConversation {
    key: ConversationKey,
    transcript: Vec<ChatMessage>,
    outbox: Outbox,
}

/// Driver-side messaging for one session.
pub struct MessagingChannel {
    driver_id: String,
    transport: Arc<dyn ChannelTransport>,
    store: Arc<dyn MessageStore>,
    open: Option<OpenConversation>,
}

impl MessagingChannel {
    /// Bind a channel to its collaborators.
    #[must_use]
    pub fn new(
        driver_id: String,
        transport: Arc<dyn ChannelTransport>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            driver_id,
            transport,
            store,
            open: None,
        }
    }

    /// Local driver id.
    #[must_use]
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Key of the open conversation.
    #[must_use]
    pub fn current(&self) -> Option<&ConversationKey> {
        self.open.as_ref().map(|c| &c.key)
    }

    /// Transcript of the open conversation, in insertion order.
    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        self.open.as_ref().map_or(&[], |c| c.transcript.as_slice())
    }

    /// Outbox of the open conversation.
    #[must_use]
    pub fn outbox(&self) -> Option<&Outbox> {
        self.open.as_ref().map(|c| &c.outbox)
    }

    /// Open `key`, seeding the transcript from persisted history.
    ///
    /// The conversation stays open with an empty transcript if the history
    /// request fails; the error is returned for the caller to report.
    ///
    /// # Errors
    ///
    /// Returns the history backend failure.
    pub async fn open(&mut self, key: ConversationKey) -> Result<usize> {
        if key.driver_id() != self.driver_id {
            return Err(AppError::Unauthorized(
                "conversation belongs to a different driver".into(),
            ));
        }

        self.open = Some(OpenConversation {
            key: key.clone(),
            transcript: Vec::new(),
            outbox: Outbox::new(),
        });

        let history = self.store.history(&self.driver_id, key.peer_id()).await?;
        let seeded: Vec<ChatMessage> = history
            .into_iter()
            .map(|wire| wire.into_chat(&self.driver_id))
            .collect();
        let count = seeded.len();

        if let Some(open) = self.open.as_mut().filter(|c| c.key == key) {
            open.transcript = seeded;
        }
        info!(peer = key.peer_id(), count, "conversation opened");
        Ok(count)
    }

    /// Close the open conversation view. The socket stays connected.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            debug!(peer = open.key.peer_id(), "conversation closed");
        }
    }

    /// Send `text` to the open conversation.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if no conversation is open,
    /// `AppError::Malformed` if `text` is blank. Publish and append
    /// failures are reported in the [`SendReport`], not as errors.
    pub async fn send(&mut self, text: &str) -> Result<SendReport> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Malformed("message is empty".into()));
        }
        let Some(open) = self.open.as_mut() else {
            return Err(AppError::NotFound("no open conversation".into()));
        };

        let message = ChatMessage::from_driver(text.to_owned());
        let wire = WireMessage::outbound(&self.driver_id, open.key.peer_id(), text);
        open.transcript.push(message.clone());
        open.outbox.track(&message.id, wire.clone());

        let published = self
            .transport
            .publish(OutboundFrame::SendMessage(wire.clone()))
            .await;
        if let Err(err) = &published {
            warn!(%err, message_id = %message.id, "publish failed");
        }
        let published = EffectState::from_result(&published);

        let persisted = self.store.append(&wire).await;
        if let Err(err) = &persisted {
            warn!(%err, message_id = %message.id, "message append failed");
        }
        let persisted = EffectState::from_result(&persisted);

        if let Some(open) = self.open.as_mut() {
            open.outbox.set_published(&message.id, published.clone());
            open.outbox.set_persisted(&message.id, persisted.clone());
        }

        Ok(SendReport {
            message,
            published,
            persisted,
        })
    }

    /// Handle an inbound `receiveMessage`.
    ///
    /// Messages belonging to the open conversation are appended in arrival
    /// order, except echoes of messages this driver already appended.
    pub fn receive(&mut self, wire: WireMessage) -> ReceiveOutcome {
        let alert = wire.from != self.driver_id;
        let mut appended = false;
        let message = wire.clone().into_chat(&self.driver_id);

        if let Some(open) = self.open.as_mut() {
            let belongs = wire.is_between(&self.driver_id, open.key.peer_id());
            let echo = !alert && open.outbox.take_echo(&wire);
            if belongs && !echo {
                open.transcript.push(message.clone());
                appended = true;
            }
        }

        ReceiveOutcome {
            message,
            appended,
            alert,
        }
    }

    /// Re-attempt the backend append for every message that failed it.
    ///
    /// Returns how many appends succeeded on this attempt.
    pub async fn retry_unpersisted(&mut self) -> usize {
        let Some(open) = self.open.as_ref() else {
            return 0;
        };
        let pending = open.outbox.unpersisted();

        let mut recovered = 0;
        for entry in pending {
            let result = self.store.append(&entry.wire).await;
            if let Err(err) = &result {
                warn!(%err, message_id = %entry.message_id, "append retry failed");
            } else {
                recovered += 1;
            }
            if let Some(open) = self.open.as_mut() {
                open.outbox
                    .set_persisted(&entry.message_id, EffectState::from_result(&result));
            }
        }
        recovered
    }
}
