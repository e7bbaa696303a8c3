//! In-process messaging for offline sessions.
//!
//! [`Loopback`] stands in for both the socket and the history backend:
//! published `sendMessage` frames are echoed back on the inbound queue the
//! way the messaging server relays them to the room, and appends are kept
//! in memory.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::channel::protocol::OutboundFrame;
use crate::channel::{ChannelTransport, MessageStore};
use crate::models::message::WireMessage;
use crate::{AppError, Result};

/// Offline transport and store.
#[derive(Debug)]
pub struct Loopback {
    inbound_tx: mpsc::Sender<WireMessage>,
    log: Mutex<Vec<WireMessage>>,
}

impl Loopback {
    /// Create a loopback and the receiver its echoes arrive on.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WireMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                inbound_tx,
                log: Mutex::new(Vec::new()),
            },
            inbound_rx,
        )
    }

    /// Every message appended so far.
    pub async fn appended(&self) -> Vec<WireMessage> {
        self.log.lock().await.clone()
    }
}

impl ChannelTransport for Loopback {
    fn publish(&self, frame: OutboundFrame) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match frame {
                OutboundFrame::Join(room) => {
                    debug!(room, "loopback join");
                    Ok(())
                }
                OutboundFrame::SendMessage(wire) => {
                    let echo = WireMessage {
                        id: Some(Uuid::new_v4().to_string()),
                        timestamp: Some(Utc::now()),
                        ..wire
                    };
                    self.inbound_tx
                        .try_send(echo)
                        .map_err(|err| AppError::Channel(format!("loopback queue: {err}")))
                }
            }
        })
    }
}

impl MessageStore for Loopback {
    fn history<'a>(
        &'a self,
        user1: &'a str,
        user2: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WireMessage>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .log
                .lock()
                .await
                .iter()
                .filter(|m| m.is_between(user1, user2))
                .cloned()
                .collect())
        })
    }

    fn append<'a>(
        &'a self,
        message: &'a WireMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.log.lock().await.push(message.clone());
            Ok(())
        })
    }
}
