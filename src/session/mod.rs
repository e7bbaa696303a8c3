//! Driver session controller.
//!
//! A [`DriverSession`] owns the [`DispatchState`], the messaging channel
//! and every background task started on behalf of one logged-in driver:
//!
//! - the offer ticker and the task applying its offers to the feed;
//! - the consumer of inbound chat messages;
//! - the post-delivery hold timers;
//! - the optional location tracker.
//!
//! All of them hang off one session [`CancellationToken`]. Dropping the
//! session or calling [`DriverSession::shutdown`] cancels them, so no timer
//! or subscription outlives the driver's login.
//!
//! When an [`OrderSync`] is attached, each transition is posted to the
//! order backend before the local state changes. A failed post leaves the
//! state untouched and raises a [`SessionEvent::Alert`]. Transitions run
//! one at a time; the state lock is not held during the backend call, so
//! offers, snapshots and hold timers proceed meanwhile.

pub mod bootstrap;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::api::orders::{OrderAction, OrderSync};
use crate::channel::conversation::{MessagingChannel, SendReport};
use crate::channel::{ChannelTransport, MessageStore};
use crate::config::{GlobalConfig, LocationConfig};
use crate::feed::source::OfferSource;
use crate::feed::ticker::{OfferTicker, OfferTickerHandle};
use crate::feed::IngestOutcome;
use crate::lifecycle::Completion;
use crate::location::tracker::{LocationTracker, LocationTrackerHandle};
use crate::location::{Debouncer, LocationSink, PositionEvent};
use crate::models::delivery::{ActiveDelivery, DeliveryStatus};
use crate::models::earnings::EarningsRecord;
use crate::models::location::GeoPoint;
use crate::models::message::{ChatMessage, ConversationKey, WireMessage};
use crate::models::offer::Offer;
use crate::navigation::{plan_route, DirectionsClient, DirectionsRequest, Route};
use crate::AppError;
use crate::Result;

pub use state::{DispatchState, StateSnapshot};

const RECENT_EARNINGS: usize = 5;

/// Notification for the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An offer became visible.
    OfferSurfaced(Offer),
    /// The active delivery was created or changed status.
    DeliveryUpdated(ActiveDelivery),
    /// The delivered hold elapsed; no delivery is active any more.
    DeliveryReleased(ActiveDelivery),
    /// A completed delivery was added to the ledger.
    EarningsRecorded(EarningsRecord),
    /// An inbound chat message. `alert` asks for a toast.
    MessageReceived {
        /// Converted message.
        message: ChatMessage,
        /// Sender is not the local driver.
        alert: bool,
    },
    /// User-visible failure.
    Alert(String),
}

/// Collaborators a session runs against.
pub struct SessionParts {
    /// Logged-in driver.
    pub driver_id: String,
    /// Where new offers come from.
    pub source: Arc<dyn OfferSource>,
    /// Order backend; `None` keeps transitions local.
    pub order_sync: Option<Arc<dyn OrderSync>>,
    /// Real-time publish side of the messaging channel.
    pub transport: Arc<dyn ChannelTransport>,
    /// Persisted chat history.
    pub store: Arc<dyn MessageStore>,
    /// Inbound `receiveMessage` payloads.
    pub inbound: mpsc::Receiver<WireMessage>,
    /// Location telemetry endpoint.
    pub location_sink: Arc<dyn LocationSink>,
}

/// One logged-in driver's running session.
pub struct DriverSession {
    driver_id: String,
    state: Arc<Mutex<DispatchState>>,
    transition: Mutex<()>,
    channel: Arc<Mutex<MessagingChannel>>,
    order_sync: Option<Arc<dyn OrderSync>>,
    location_sink: Arc<dyn LocationSink>,
    directions: Option<DirectionsClient>,
    location: LocationConfig,
    hold: Duration,
    event_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
    ticker: Option<OfferTickerHandle>,
    tracker: Option<LocationTrackerHandle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl DriverSession {
    /// Start a session and its background tasks.
    ///
    /// Must be called from within a tokio runtime. `cancel` becomes the
    /// session token; tasks started elsewhere for this session (the socket)
    /// should use a child of it.
    #[must_use]
    pub fn start(
        config: &GlobalConfig,
        parts: SessionParts,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel.queue_capacity);
        let state = Arc::new(Mutex::new(DispatchState::from_config(config)));
        let channel = Arc::new(Mutex::new(MessagingChannel::new(
            parts.driver_id.clone(),
            parts.transport,
            parts.store,
        )));

        let (offer_tx, offer_rx) = mpsc::channel(config.feed.max_backlog.max(1));
        let ticker = OfferTicker::new(
            config.feed.generation_interval(),
            Arc::clone(&parts.source),
            offer_tx,
            cancel.child_token(),
        )
        .spawn();

        let tasks = vec![
            spawn_feed_consumer(
                offer_rx,
                parts.source,
                Arc::clone(&state),
                event_tx.clone(),
                cancel.clone(),
            ),
            spawn_inbound_consumer(
                parts.inbound,
                Arc::clone(&channel),
                event_tx.clone(),
                cancel.clone(),
            ),
        ];

        info!(driver_id = %parts.driver_id, "driver session started");

        (
            Self {
                driver_id: parts.driver_id,
                state,
                transition: Mutex::new(()),
                channel,
                order_sync: parts.order_sync,
                location_sink: parts.location_sink,
                directions: None,
                location: config.location.clone(),
                hold: config.lifecycle.hold(),
                event_tx,
                cancel,
                ticker: Some(ticker),
                tracker: None,
                tasks: Mutex::new(tasks),
            },
            event_rx,
        )
    }

    /// Resolve routes through `client`.
    #[must_use]
    pub fn with_directions(mut self, client: DirectionsClient) -> Self {
        self.directions = Some(client);
        self
    }

    /// Logged-in driver.
    #[must_use]
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Shared state, for callers that need more than [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<DispatchState>> {
        Arc::clone(&self.state)
    }

    /// Current state for rendering.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.state
            .lock()
            .await
            .snapshot(Local::now().naive_local(), RECENT_EARNINGS)
    }

    /// Apply an offer to the feed as a generation tick would.
    pub async fn push_offer(&self, offer: Offer) -> IngestOutcome {
        apply_offer(&self.state, &self.event_tx, offer).await
    }

    /// Flip the notification gate.
    pub async fn set_notifications(&self, enabled: bool) -> Vec<Offer> {
        let surfaced = self.state.lock().await.set_notifications(enabled);
        for offer in &surfaced {
            emit(&self.event_tx, SessionEvent::OfferSurfaced(offer.clone()));
        }
        surfaced
    }

    /// Accept the visible offer `offer_id`.
    ///
    /// # Errors
    ///
    /// State errors per [`DispatchState::accept`], or the order backend
    /// failure, in which case nothing changes.
    pub async fn accept(&self, offer_id: &str) -> Result<Option<ActiveDelivery>> {
        let _turn = self.transition.lock().await;
        let Some(offer) = self.state.lock().await.acceptable(offer_id)? else {
            return Ok(None);
        };
        self.sync(&offer.id, OrderAction::Accept).await?;

        let delivery = self.state.lock().await.accept(&offer.id)?;
        if let Some(delivery) = &delivery {
            emit(&self.event_tx, SessionEvent::DeliveryUpdated(delivery.clone()));
        }
        Ok(delivery)
    }

    /// Reject the visible offer `offer_id`.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` for an offer that is not visible (strict policy
    /// only), or the order backend failure.
    pub async fn reject(&self, offer_id: &str) -> Result<bool> {
        let _turn = self.transition.lock().await;
        if !self.state.lock().await.rejectable(offer_id)? {
            return Ok(false);
        }
        self.sync(offer_id, OrderAction::Reject).await?;
        self.state.lock().await.reject(offer_id)
    }

    /// Confirm pickup of the active delivery.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` (strict policy only), or the
    /// order backend failure.
    pub async fn confirm_pickup(&self) -> Result<Option<ActiveDelivery>> {
        let _turn = self.transition.lock().await;
        let Some(active) = self
            .state
            .lock()
            .await
            .advanceable(DeliveryStatus::PickedUpEnRouteToCustomer)?
        else {
            return Ok(None);
        };
        self.sync(&active.original_id, OrderAction::OnShipping).await?;

        let updated = self.state.lock().await.confirm_pickup(Local::now().time())?;
        if let Some(delivery) = &updated {
            emit(&self.event_tx, SessionEvent::DeliveryUpdated(delivery.clone()));
        }
        Ok(updated)
    }

    /// Confirm delivery of the active delivery and start its display hold.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` (strict policy only), or the
    /// order backend failure.
    pub async fn confirm_delivery(&self) -> Result<Option<Completion>> {
        let _turn = self.transition.lock().await;
        let Some(active) = self.state.lock().await.advanceable(DeliveryStatus::Delivered)? else {
            return Ok(None);
        };
        self.sync(&active.original_id, OrderAction::Delivered).await?;

        let completed = self
            .state
            .lock()
            .await
            .confirm_delivery(Local::now().naive_local())?;
        let Some(completion) = completed else {
            return Ok(None);
        };

        emit(
            &self.event_tx,
            SessionEvent::DeliveryUpdated(completion.delivery.clone()),
        );
        emit(
            &self.event_tx,
            SessionEvent::EarningsRecorded(completion.record.clone()),
        );

        let hold = spawn_hold_timer(
            completion.delivery.id.clone(),
            self.hold,
            Arc::clone(&self.state),
            self.event_tx.clone(),
            self.cancel.clone(),
        );
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(hold);

        Ok(Some(completion))
    }

    /// Directions query from `origin` for the current leg, if a delivery is
    /// active.
    pub async fn route_request(&self, origin: GeoPoint) -> Option<DirectionsRequest> {
        let state = self.state.lock().await;
        let lifecycle = state.lifecycle();
        match (lifecycle.destination(), lifecycle.active()) {
            (Some(destination), Some(active)) => Some(plan_route(origin, destination, active)),
            _ => None,
        }
    }

    /// Fetch and decode the route from `origin` for the current leg.
    /// `Ok(None)` when no delivery is active.
    ///
    /// # Errors
    ///
    /// `AppError::Config` when no directions client is attached, otherwise
    /// the [`DirectionsClient::route`] failure.
    pub async fn route(&self, origin: GeoPoint) -> Result<Option<Route>> {
        let Some(client) = &self.directions else {
            return Err(AppError::Config("directions disabled: no maps api key".into()));
        };
        let Some(request) = self.route_request(origin).await else {
            return Ok(None);
        };
        client.route(&request).await.map(Some)
    }

    /// Open the chat for the active delivery's counterpart, or a support
    /// thread when no delivery is active.
    ///
    /// # Errors
    ///
    /// The history load failure. The conversation still opens, empty.
    pub async fn open_chat(&self) -> Result<ConversationKey> {
        let key = {
            let state = self.state.lock().await;
            match state.lifecycle().active() {
                Some(active) => ConversationKey::Delivery {
                    driver_id: self.driver_id.clone(),
                    counterpart_id: active.counterpart_id.clone(),
                },
                None => ConversationKey::new_support(self.driver_id.clone()),
            }
        };

        if let Err(err) = self.channel.lock().await.open(key.clone()).await {
            warn!(%err, peer = key.peer_id(), "history load failed");
            emit(&self.event_tx, SessionEvent::Alert(err.to_string()));
            return Err(err);
        }
        Ok(key)
    }

    /// Close the chat view. The socket stays up.
    pub async fn close_chat(&self) {
        self.channel.lock().await.close();
    }

    /// Transcript of the open chat.
    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.channel.lock().await.transcript().to_vec()
    }

    /// Send `text` on the open chat.
    ///
    /// # Errors
    ///
    /// See [`MessagingChannel::send`].
    pub async fn send_message(&self, text: &str) -> Result<SendReport> {
        self.channel.lock().await.send(text).await
    }

    /// Retry persisting chat messages whose append failed.
    pub async fn retry_unpersisted(&self) -> usize {
        self.channel.lock().await.retry_unpersisted().await
    }

    /// Start forwarding debounced positions from `positions`. Replaces (and
    /// cancels) a tracker that is already running.
    pub fn start_tracking(&mut self, positions: mpsc::Receiver<PositionEvent>) {
        let (alert_tx, alert_rx) = mpsc::channel(1);
        let tracker = LocationTracker::new(
            self.driver_id.clone(),
            Debouncer::from_config(&self.location),
            Arc::clone(&self.location_sink),
            self.cancel.child_token(),
        )
        .with_alerts(alert_tx)
        .spawn(positions);

        let forwarder = spawn_alert_forwarder(alert_rx, self.event_tx.clone());
        self.tasks.get_mut().push(forwarder);
        self.tracker = Some(tracker);
    }

    /// Stop location tracking.
    pub async fn stop_tracking(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            let exit = tracker.stop().await;
            debug!(?exit, "location tracking stopped");
        }
    }

    /// Whether a tracker is running.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracker.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel every session task and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(ticker) = self.ticker.take() {
            ticker.await_completion().await;
        }
        if let Some(tracker) = self.tracker.take() {
            let _ = tracker.stop().await;
        }
        for task in self.tasks.get_mut().drain(..) {
            let _ = task.await;
        }
        info!(driver_id = %self.driver_id, "driver session stopped");
    }

    async fn sync(&self, order_id: &str, action: OrderAction) -> Result<()> {
        let Some(order_sync) = &self.order_sync else {
            return Ok(());
        };
        if let Err(err) = order_sync.update(order_id, action).await {
            warn!(%err, order_id, action = action.target_status(), "order update failed; transition abandoned");
            emit(&self.event_tx, SessionEvent::Alert(err.to_string()));
            return Err(err);
        }
        Ok(())
    }
}

/// Queue `event` for the UI; a full queue drops it with a warning.
fn emit(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(err) = event_tx.try_send(event) {
        warn!(%err, "session event dropped");
    }
}

async fn apply_offer(
    state: &Mutex<DispatchState>,
    event_tx: &mpsc::Sender<SessionEvent>,
    offer: Offer,
) -> IngestOutcome {
    let offer_id = offer.id.clone();
    let surfaced = offer.clone();
    let outcome = state.lock().await.ingest(offer);
    debug!(%offer_id, ?outcome, "offer ingested");
    if outcome == IngestOutcome::Surfaced {
        emit(event_tx, SessionEvent::OfferSurfaced(surfaced));
    }
    outcome
}

/// Applies ticked offers to the feed. An offer refused for lack of room
/// goes back to its source.
fn spawn_feed_consumer(
    mut offer_rx: mpsc::Receiver<Offer>,
    source: Arc<dyn OfferSource>,
    state: Arc<Mutex<DispatchState>>,
    event_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            loop {
                let offer = tokio::select! {
                    () = cancel.cancelled() => return,
                    offer = offer_rx.recv() => offer,
                };
                let Some(offer) = offer else {
                    return;
                };
                let returned = offer.clone();
                if apply_offer(&state, &event_tx, offer).await == IngestOutcome::BacklogFull {
                    source.requeue(returned).await;
                }
            }
        }
        .instrument(info_span!("feed_consumer")),
    )
}

fn spawn_inbound_consumer(
    mut inbound: mpsc::Receiver<WireMessage>,
    channel: Arc<Mutex<MessagingChannel>>,
    event_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            loop {
                let wire = tokio::select! {
                    () = cancel.cancelled() => return,
                    wire = inbound.recv() => wire,
                };
                let Some(wire) = wire else {
                    debug!("inbound message stream closed");
                    return;
                };
                let outcome = channel.lock().await.receive(wire);
                emit(
                    &event_tx,
                    SessionEvent::MessageReceived {
                        message: outcome.message,
                        alert: outcome.alert,
                    },
                );
            }
        }
        .instrument(info_span!("inbound_messages")),
    )
}

fn spawn_hold_timer(
    delivery_id: String,
    hold: Duration,
    state: Arc<Mutex<DispatchState>>,
    event_tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(hold) => {}
            }
            let Some((released, surfaced)) = state.lock().await.release(&delivery_id) else {
                return;
            };
            emit(&event_tx, SessionEvent::DeliveryReleased(released));
            for offer in surfaced {
                emit(&event_tx, SessionEvent::OfferSurfaced(offer));
            }
        }
        .instrument(info_span!("delivery_hold")),
    )
}

fn spawn_alert_forwarder(
    mut alert_rx: mpsc::Receiver<AppError>,
    event_tx: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(err) = alert_rx.recv().await {
            emit(&event_tx, SessionEvent::Alert(err.to_string()));
        }
    })
}
