//! Wiring a session against the live backend.
//!
//! [`authenticate`] logs in (or restores the stored token),
//! [`connect`] builds the REST adapters, opens the messaging socket and
//! starts a [`DriverSession`], and [`logout`] tears everything down.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::auth;
use crate::api::location::LocationApi;
use crate::api::messages::MessagesApi;
use crate::api::orders::{BackendOffers, OrderSync, OrdersApi};
use crate::api::profile::{own_profile, Profile};
use crate::api::ApiClient;
use crate::channel::loopback::Loopback;
use crate::channel::socket::{spawn_socket, SocketSettings};
use crate::channel::ChannelTransport;
use crate::config::{GlobalConfig, OfferSourceKind};
use crate::credentials::{CredentialStore, Credentials};
use crate::feed::source::{OfferSource, SyntheticOffers};
use crate::location::LocationSink;
use crate::models::location::GeoPoint;
use crate::navigation::DirectionsClient;
use crate::session::{DriverSession, SessionEvent, SessionParts};
use crate::{AppError, Result};

/// Email and password for an interactive login.
#[derive(Debug, Clone)]
pub struct Login {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Authenticated client plus the credentials it carries.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Client with the bearer token attached.
    pub client: ApiClient,
    /// Token and driver id.
    pub credentials: Credentials,
}

impl Connection {
    /// Fetch the driver's own profile.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    pub async fn profile(&self) -> Result<Profile> {
        own_profile(&self.client).await
    }
}

/// Log in with `login`, or restore the session held in `store`.
///
/// # Errors
///
/// `AppError::Unauthorized` if no login is given and nothing is stored,
/// otherwise the login or storage failure.
pub async fn authenticate(
    config: &GlobalConfig,
    store: &dyn CredentialStore,
    login: Option<&Login>,
) -> Result<Connection> {
    let anonymous = ApiClient::from_config(&config.backend)?;
    let credentials = match login {
        Some(login) => auth::login(&anonymous, store, &login.email, &login.password).await?,
        None => store
            .load()?
            .ok_or_else(|| AppError::Unauthorized("no stored session; log in first".into()))?,
    };
    info!(user_id = %credentials.user_id, restored = login.is_none(), "session authenticated");
    Ok(Connection {
        client: anonymous.with_token(credentials.token.clone()),
        credentials,
    })
}

/// Start a session against the backend in `connection`.
///
/// The socket task runs on a child of the session token, so it closes with
/// the session.
#[must_use]
pub fn connect(
    config: &GlobalConfig,
    connection: &Connection,
) -> (DriverSession, mpsc::Receiver<SessionEvent>) {
    let cancel = CancellationToken::new();
    let driver_id = connection.credentials.user_id.clone();
    let orders = OrdersApi::new(connection.client.clone());

    // Synthetic ids do not exist on the order backend, so only backend
    // offers are synced.
    let source: Arc<dyn OfferSource>;
    let mut order_sync: Option<Arc<dyn OrderSync>> = None;
    match config.feed.source {
        OfferSourceKind::Synthetic => source = Arc::new(SyntheticOffers::new()),
        OfferSourceKind::Backend => {
            source = Arc::new(BackendOffers::new(orders.clone()));
            order_sync = Some(Arc::new(orders));
        }
    }

    let settings =
        SocketSettings::from_config(&config.backend.socket_url, &driver_id, &config.channel);
    let (socket, inbound) = spawn_socket(settings, cancel.child_token());

    let parts = SessionParts {
        driver_id,
        source,
        order_sync,
        transport: Arc::new(socket),
        store: Arc::new(MessagesApi::new(connection.client.clone())),
        inbound,
        location_sink: Arc::new(LocationApi::new(connection.client.clone())),
    };
    attach_directions(DriverSession::start(config, parts, cancel), config)
}

/// Start a session with no backend: synthetic offers, in-process chat and
/// location updates that are only logged.
#[must_use]
pub fn connect_offline(
    config: &GlobalConfig,
    driver_id: &str,
) -> (DriverSession, mpsc::Receiver<SessionEvent>) {
    let (loopback, inbound) = Loopback::new(config.channel.queue_capacity);
    let loopback = Arc::new(loopback);
    let transport: Arc<dyn ChannelTransport> = loopback.clone();
    let parts = SessionParts {
        driver_id: driver_id.to_owned(),
        source: Arc::new(SyntheticOffers::new()),
        order_sync: None,
        transport,
        store: loopback,
        inbound,
        location_sink: Arc::new(LoggingSink),
    };
    attach_directions(
        DriverSession::start(config, parts, CancellationToken::new()),
        config,
    )
}

/// Attach a directions client when a maps key was loaded.
fn attach_directions(
    (session, events): (DriverSession, mpsc::Receiver<SessionEvent>),
    config: &GlobalConfig,
) -> (DriverSession, mpsc::Receiver<SessionEvent>) {
    if config.maps.api_key.is_empty() {
        return (session, events);
    }
    match DirectionsClient::from_config(&config.maps, config.backend.request_timeout()) {
        Ok(client) => (session.with_directions(client), events),
        Err(err) => {
            warn!(%err, "directions client unavailable");
            (session, events)
        }
    }
}

/// End the session, then log out of the backend and clear stored
/// credentials.
///
/// # Errors
///
/// The backend logout failure; local credentials are cleared regardless.
pub async fn logout(
    session: DriverSession,
    connection: &Connection,
    store: &dyn CredentialStore,
) -> Result<()> {
    session.shutdown().await;
    auth::logout(&connection.client, store).await
}

#[derive(Debug)]
struct LoggingSink;

impl LocationSink for LoggingSink {
    fn push<'a>(
        &'a self,
        user_id: &'a str,
        point: GeoPoint,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                user_id,
                latitude = point.latitude,
                longitude = point.longitude,
                "location update"
            );
            Ok(())
        })
    }
}
