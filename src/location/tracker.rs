//! Background location tracker.
//!
//! Dropping the [`LocationTrackerHandle`] cancels the task, so a logged-out
//! session never keeps sending telemetry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::location::{Debouncer, LocationSink, PositionEvent};
use crate::AppError;

/// Why the tracker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerExit {
    /// Cancelled by the session.
    Cancelled,
    /// The platform position stream ended.
    StreamClosed,
    /// Location permission was denied.
    PermissionDenied,
}

/// Builder for the tracking task.
pub struct LocationTracker {
    user_id: String,
    debouncer: Debouncer,
    sink: Arc<dyn LocationSink>,
    alert_tx: Option<mpsc::Sender<AppError>>,
    cancel: CancellationToken,
}

impl LocationTracker {
    /// Construct a tracker (does not start it yet).
    #[must_use]
    pub fn new(
        user_id: String,
        debouncer: Debouncer,
        sink: Arc<dyn LocationSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            user_id,
            debouncer,
            sink,
            alert_tx: None,
            cancel,
        }
    }

    /// Report permission denial through `alert_tx`.
    #[must_use]
    pub fn with_alerts(mut self, alert_tx: mpsc::Sender<AppError>) -> Self {
        self.alert_tx = Some(alert_tx);
        self
    }

    /// Spawn the tracking task over `positions`.
    #[must_use]
    pub fn spawn(self, positions: mpsc::Receiver<PositionEvent>) -> LocationTrackerHandle {
        let cancel = self.cancel.clone();
        let join_handle = tokio::spawn(self.run(positions).instrument(info_span!("location_tracker")));
        LocationTrackerHandle {
            join_handle: Some(join_handle),
            cancel,
        }
    }

    async fn run(mut self, mut positions: mpsc::Receiver<PositionEvent>) -> TrackerExit {
        info!(user_id = %self.user_id, "location tracking started");
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("location tracker cancelled");
                    return TrackerExit::Cancelled;
                }
                event = positions.recv() => event,
            };

            match event {
                None => {
                    debug!("position stream closed");
                    return TrackerExit::StreamClosed;
                }
                Some(PositionEvent::PermissionDenied) => {
                    warn!("location permission denied; tracking stopped");
                    if let Some(alert_tx) = &self.alert_tx {
                        let _ = alert_tx
                            .send(AppError::Location("location permission denied".into()))
                            .await;
                    }
                    return TrackerExit::PermissionDenied;
                }
                Some(PositionEvent::Fix(point)) => {
                    let now = Instant::now();
                    if !self.debouncer.should_send(&point, now) {
                        continue;
                    }
                    // Failed pushes are not recorded, so the next fix is
                    // measured against the last fix that reached the backend.
                    match self.sink.push(&self.user_id, point).await {
                        Ok(()) => self.debouncer.mark_sent(point, now),
                        Err(err) => warn!(%err, "location push failed"),
                    }
                }
            }
        }
    }
}

/// Handle for a running tracker; cancels it on drop.
pub struct LocationTrackerHandle {
    join_handle: Option<JoinHandle<TrackerExit>>,
    cancel: CancellationToken,
}

impl Drop for LocationTrackerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LocationTrackerHandle {
    /// Whether the task has finished on its own or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop tracking and wait for the task; returns how it ended.
    pub async fn stop(mut self) -> Option<TrackerExit> {
        self.cancel.cancel();
        match self.join_handle.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        }
    }

    /// Wait for the task to end on its own (stream closed or permission
    /// denied) without cancelling it.
    pub async fn join(mut self) -> Option<TrackerExit> {
        match self.join_handle.take() {
            Some(handle) => handle.await.ok(),
            None => None,
        }
    }
}
