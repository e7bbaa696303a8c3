//! Driver location telemetry.
//!
//! Position fixes from the platform location API arrive on an `mpsc`
//! channel as [`PositionEvent`]s. The [`tracker`] forwards a fix to the
//! [`LocationSink`] only when both the minimum interval has elapsed and
//! the minimum distance has been covered since the last sent fix.

pub mod tracker;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LocationConfig;
use crate::models::location::GeoPoint;
use crate::Result;

/// Input from the platform location API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionEvent {
    /// A new position fix.
    Fix(GeoPoint),
    /// The user denied location permission.
    PermissionDenied,
}

/// Receives debounced position updates.
pub trait LocationSink: Send + Sync {
    /// Push `point` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    fn push<'a>(
        &'a self,
        user_id: &'a str,
        point: GeoPoint,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Time-and-distance debounce.
#[derive(Debug, Clone)]
pub struct Debouncer {
    min_interval: Duration,
    min_distance_meters: f64,
    last: Option<(GeoPoint, Instant)>,
}

impl Debouncer {
    /// Create a debouncer; the first fix always passes.
    #[must_use]
    pub fn new(min_interval: Duration, min_distance_meters: f64) -> Self {
        Self {
            min_interval,
            min_distance_meters,
            last: None,
        }
    }

    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &LocationConfig) -> Self {
        Self::new(
            Duration::from_secs(config.min_interval_seconds),
            config.min_distance_meters,
        )
    }

    /// Whether `point` observed at `now` should be sent. Does not record it.
    #[must_use]
    pub fn should_send(&self, point: &GeoPoint, now: Instant) -> bool {
        match &self.last {
            None => true,
            Some((last_point, last_at)) => {
                now.saturating_duration_since(*last_at) >= self.min_interval
                    && last_point.distance_to(point) >= self.min_distance_meters
            }
        }
    }

    /// Record `point` as sent at `now`.
    pub fn mark_sent(&mut self, point: GeoPoint, now: Instant) {
        self.last = Some((point, now));
    }
}
