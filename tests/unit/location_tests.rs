//! Unit tests for the location debounce and the tracking task.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dsp_courier::location::tracker::{LocationTracker, TrackerExit};
use dsp_courier::location::{Debouncer, LocationSink, PositionEvent};
use dsp_courier::models::location::GeoPoint;
use dsp_courier::{AppError, Result};

const INTERVAL: Duration = Duration::from_secs(10);

#[derive(Default)]
struct RecordingSink {
    pushed: Mutex<Vec<(String, GeoPoint)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    fn pushed(&self) -> Vec<GeoPoint> {
        self.pushed.lock().expect("lock").iter().map(|(_, p)| *p).collect()
    }
}

impl LocationSink for RecordingSink {
    fn push<'a>(
        &'a self,
        user_id: &'a str,
        point: GeoPoint,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Http("location endpoint down".into()));
            }
            self.pushed
                .lock()
                .expect("lock")
                .push((user_id.to_owned(), point));
            Ok(())
        })
    }
}

fn origin() -> GeoPoint {
    GeoPoint::new(37.7749, -122.4194)
}

/// Roughly 111 m north of `origin`.
fn north() -> GeoPoint {
    GeoPoint::new(37.7759, -122.4194)
}

#[test]
fn haversine_distance_is_plausible() {
    let d = origin().distance_to(&north());
    assert!((105.0..120.0).contains(&d), "got {d}");
    assert!(origin().distance_to(&origin()).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn first_fix_always_passes() {
    let debouncer = Debouncer::new(INTERVAL, 25.0);
    assert!(debouncer.should_send(&origin(), Instant::now()));
}

#[tokio::test(start_paused = true)]
async fn both_thresholds_must_be_met() {
    let mut debouncer = Debouncer::new(INTERVAL, 25.0);
    let start = Instant::now();
    debouncer.mark_sent(origin(), start);

    // Far enough, too soon.
    assert!(!debouncer.should_send(&north(), start + Duration::from_secs(3)));
    // Late enough, not far enough.
    assert!(!debouncer.should_send(&origin(), start + INTERVAL));
    // Both.
    assert!(debouncer.should_send(&north(), start + INTERVAL));
}

#[tokio::test(start_paused = true)]
async fn tracker_debounces_fixes() {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let tracker = LocationTracker::new(
        "driver-7".into(),
        Debouncer::new(INTERVAL, 25.0),
        sink.clone(),
        CancellationToken::new(),
    );
    let handle = tracker.spawn(rx);

    tx.send(PositionEvent::Fix(origin())).await.expect("send");
    tx.send(PositionEvent::Fix(north())).await.expect("send");
    tokio::time::sleep(INTERVAL).await;
    tx.send(PositionEvent::Fix(north())).await.expect("send");
    drop(tx);

    assert_eq!(handle.join().await, Some(TrackerExit::StreamClosed));
    assert_eq!(sink.pushed(), [origin(), north()]);
    assert!(sink
        .pushed
        .lock()
        .expect("lock")
        .iter()
        .all(|(user, _)| user == "driver-7"));
}

#[tokio::test(start_paused = true)]
async fn failed_push_is_retried_on_next_fix() {
    let sink = Arc::new(RecordingSink::default());
    sink.failing.store(true, Ordering::SeqCst);
    let (tx, rx) = mpsc::channel(8);
    let handle = LocationTracker::new(
        "driver-7".into(),
        Debouncer::new(INTERVAL, 25.0),
        sink.clone(),
        CancellationToken::new(),
    )
    .spawn(rx);

    tx.send(PositionEvent::Fix(origin())).await.expect("send");
    tokio::time::sleep(Duration::from_secs(1)).await;
    sink.failing.store(false, Ordering::SeqCst);
    tx.send(PositionEvent::Fix(origin())).await.expect("send");
    drop(tx);

    assert_eq!(handle.join().await, Some(TrackerExit::StreamClosed));
    assert_eq!(sink.pushed(), [origin()]);
}

#[tokio::test]
async fn permission_denied_alerts_and_stops() {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let (alert_tx, mut alert_rx) = mpsc::channel(1);
    let handle = LocationTracker::new(
        "driver-7".into(),
        Debouncer::new(INTERVAL, 25.0),
        sink.clone(),
        CancellationToken::new(),
    )
    .with_alerts(alert_tx)
    .spawn(rx);

    tx.send(PositionEvent::PermissionDenied).await.expect("send");

    let alert = alert_rx.recv().await.expect("alert");
    assert!(matches!(alert, AppError::Location(_)));
    assert_eq!(handle.join().await, Some(TrackerExit::PermissionDenied));
    assert!(sink.pushed().is_empty());
}

#[tokio::test]
async fn stop_cancels_tracking() {
    let sink = Arc::new(RecordingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let handle = LocationTracker::new(
        "driver-7".into(),
        Debouncer::new(INTERVAL, 25.0),
        sink.clone(),
        cancel.clone(),
    )
    .spawn(rx);

    assert_eq!(handle.stop().await, Some(TrackerExit::Cancelled));
    assert!(cancel.is_cancelled());
    assert!(tx.send(PositionEvent::Fix(origin())).await.is_err(), "receiver dropped");
    assert!(sink.pushed().is_empty());
}
