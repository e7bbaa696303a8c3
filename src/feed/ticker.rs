//! Scheduled offer generation.
//!
//! An [`OfferTicker`] polls its [`OfferSource`] once per interval and
//! forwards each new offer through a `tokio::sync::mpsc` channel so the
//! session can apply it to the feed. The first poll happens one full
//! interval after spawning.
//!
//! The background task is bound to a [`CancellationToken`]; dropping the
//! returned [`OfferTickerHandle`] cancels it so no timer outlives the
//! session that started it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::feed::source::OfferSource;
use crate::models::offer::Offer;

/// Builder for the offer generation task.
pub struct OfferTicker {
    period: Duration,
    source: Arc<dyn OfferSource>,
    offer_tx: mpsc::Sender<Offer>,
    cancel: CancellationToken,
}

impl OfferTicker {
    /// Construct a ticker (does not start it yet).
    #[must_use]
    pub fn new(
        period: Duration,
        source: Arc<dyn OfferSource>,
        offer_tx: mpsc::Sender<Offer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            period,
            source,
            offer_tx,
            cancel,
        }
    }

    /// Spawn the background task and return its handle.
    #[must_use]
    pub fn spawn(self) -> OfferTickerHandle {
        let cancel = self.cancel.clone();
        let join_handle = tokio::spawn(
            Self::run(self.period, self.source, self.offer_tx, self.cancel)
                .instrument(info_span!("offer_ticker")),
        );
        OfferTickerHandle {
            join_handle: Some(join_handle),
            cancel,
        }
    }

    async fn run(
        period: Duration,
        source: Arc<dyn OfferSource>,
        offer_tx: mpsc::Sender<Offer>,
        cancel: CancellationToken,
    ) {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("offer ticker cancelled");
                    return;
                }
                _ = ticks.tick() => {}
            }

            let next = tokio::select! {
                () = cancel.cancelled() => return,
                next = source.next_offer() => next,
            };

            match next {
                Ok(Some(offer)) => {
                    debug!(offer_id = %offer.id, "offer generated");
                    if offer_tx.send(offer).await.is_err() {
                        debug!("offer receiver closed, stopping ticker");
                        return;
                    }
                }
                Ok(None) => debug!("no new offer this tick"),
                Err(err) => warn!(%err, "offer source failed; will retry next tick"),
            }
        }
    }
}

/// Handle for a running [`OfferTicker`]; cancels the task on drop.
pub struct OfferTickerHandle {
    join_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Drop for OfferTickerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl OfferTickerHandle {
    /// Whether the ticker has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the ticker and wait for the task to exit.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
