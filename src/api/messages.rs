//! Message history and append endpoints.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::api::ApiClient;
use crate::channel::MessageStore;
use crate::models::message::WireMessage;
use crate::Result;

/// History replies come as a bare array or `{ "messages": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryEnvelope {
    Bare(Vec<WireMessage>),
    Wrapped {
        #[serde(default)]
        messages: Vec<WireMessage>,
    },
}

/// REST-backed [`MessageStore`].
#[derive(Debug, Clone)]
pub struct MessagesApi {
    client: ApiClient,
}

impl MessagesApi {
    /// Wrap an authenticated client.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `GET /messages/history?user1=&user2=`, in server order.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    pub async fn fetch_history(&self, user1: &str, user2: &str) -> Result<Vec<WireMessage>> {
        let envelope: HistoryEnvelope = self
            .client
            .get_json_query("/messages/history", &[("user1", user1), ("user2", user2)])
            .await?;
        Ok(match envelope {
            HistoryEnvelope::Bare(messages) | HistoryEnvelope::Wrapped { messages } => messages,
        })
    }

    /// `POST /messages/send` with `{from, to, content}`.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    pub async fn send(&self, message: &WireMessage) -> Result<()> {
        self.client
            .post_unit(
                "/messages/send",
                &WireMessage::outbound(&message.from, &message.to, &message.content),
            )
            .await
    }
}

impl MessageStore for MessagesApi {
    fn history<'a>(
        &'a self,
        user1: &'a str,
        user2: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WireMessage>>> + Send + 'a>> {
        Box::pin(self.fetch_history(user1, user2))
    }

    fn append<'a>(
        &'a self,
        message: &'a WireMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.send(message))
    }
}
