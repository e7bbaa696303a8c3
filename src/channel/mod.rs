//! Real-time messaging between the driver and customers, merchants or
//! support.
//!
//! The channel pairs two collaborators behind traits so the conversation
//! logic never depends on a concrete network stack:
//!
//! - [`ChannelTransport`] publishes frames over the long-lived socket
//!   (implemented by [`socket::SocketHandle`]);
//! - [`MessageStore`] loads and appends persisted history
//!   (implemented by [`crate::api::messages::MessagesApi`]).
//!
//! [`loopback::Loopback`] implements both for offline sessions.

pub mod conversation;
pub mod loopback;
pub mod outbox;
pub mod protocol;
pub mod socket;

use std::future::Future;
use std::pin::Pin;

use crate::models::message::WireMessage;
use crate::Result;

use self::protocol::OutboundFrame;

/// Publishes frames over the real-time connection.
pub trait ChannelTransport: Send + Sync {
    /// Hand `frame` to the connection for immediate delivery.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` when the connection is down or its
    /// outbound queue is closed.
    fn publish(&self, frame: OutboundFrame) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Durable conversation history.
pub trait MessageStore: Send + Sync {
    /// Ordered history between `user1` and `user2`.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    fn history<'a>(
        &'a self,
        user1: &'a str,
        user2: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<WireMessage>>> + Send + 'a>>;

    /// Append one message.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    fn append<'a>(
        &'a self,
        message: &'a WireMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
