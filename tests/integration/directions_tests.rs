//! Directions client and session routing against the axum mock backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use dsp_courier::config::GlobalConfig;
use dsp_courier::models::location::GeoPoint;
use dsp_courier::navigation::{DirectionsClient, DirectionsRequest};
use dsp_courier::AppError;

use super::test_helpers::{offer, start_session, test_config, MockBackend};

const SAMPLE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";
const MAPS_KEY: &str = "maps-key";

fn ok_route() -> Value {
    json!({
        "status": "OK",
        "routes": [{
            "overview_polyline": {"points": SAMPLE},
            "legs": [
                {"distance": {"text": "1.2 km", "value": 1200}, "duration": {"text": "4 mins", "value": 240}},
                {"distance": {"text": "0.8 km", "value": 800}, "duration": {"text": "3 mins", "value": 180}}
            ]
        }]
    })
}

async fn maps_config(mock: &Arc<MockBackend>) -> GlobalConfig {
    let base = mock.spawn().await;
    let mut config = test_config(&base, "ws://127.0.0.1:9");
    config.maps.directions_url = format!("{base}/maps/directions/json");
    config.maps.api_key = MAPS_KEY.to_owned();
    config
}

fn client(config: &GlobalConfig) -> DirectionsClient {
    DirectionsClient::from_config(&config.maps, Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn route_sends_driving_query_and_decodes_path() {
    let mock = MockBackend::new();
    mock.set(&mock.directions, ok_route());
    let config = maps_config(&mock).await;

    let request = DirectionsRequest::new("37.77,-122.42", "34 Elm Ct").via("Burger Barn");
    let route = client(&config).route(&request).await.expect("route");

    assert_eq!(route.path.len(), 3);
    assert!((route.path[0].latitude - 38.5).abs() < 1e-6);
    assert!((route.path[0].longitude + 120.2).abs() < 1e-6);
    assert_eq!(route.total_distance_meters(), 2000);
    assert_eq!(route.total_duration(), Duration::from_secs(420));

    let sent = mock.requests_to("/maps/directions/json");
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body,
        json!({
            "origin": "37.77,-122.42",
            "destination": "34 Elm Ct",
            "waypoints": "Burger Barn",
            "mode": "driving",
            "key": MAPS_KEY
        })
    );
}

#[tokio::test]
async fn non_success_status_is_http_error() {
    let mock = MockBackend::new();
    mock.fail(&mock.fail_directions, true);
    let config = maps_config(&mock).await;

    let err = client(&config)
        .route(&DirectionsRequest::new("a", "b"))
        .await
        .expect_err("502");
    assert!(matches!(err, AppError::Http(ref msg) if msg.contains("502")), "got {err:?}");
}

#[tokio::test]
async fn denied_key_is_unauthorized() {
    let mock = MockBackend::new();
    mock.set(
        &mock.directions,
        json!({"status": "REQUEST_DENIED", "error_message": "bad key", "routes": []}),
    );
    let config = maps_config(&mock).await;

    let err = client(&config)
        .route(&DirectionsRequest::new("a", "b"))
        .await
        .expect_err("denied");
    assert!(matches!(err, AppError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn session_routes_current_leg() {
    let mock = MockBackend::new();
    mock.set(&mock.directions, ok_route());
    let config = maps_config(&mock).await;
    let (session, _events, _harness) = start_session(&config, false);
    let session = session.with_directions(client(&config));
    let here = GeoPoint::new(37.77, -122.42);

    assert!(session.route(here).await.expect("idle").is_none());
    assert!(mock.requests_to("/maps/directions/json").is_empty());

    session.push_offer(offer("n1", "$8.50")).await;
    session.accept("n1").await.expect("accept");
    let route = session.route(here).await.expect("route").expect("active leg");
    assert_eq!(route.path.len(), 3);

    session.confirm_pickup().await.expect("pickup");
    session.route(here).await.expect("route");

    let sent = mock.requests_to("/maps/directions/json");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].body["destination"], "34 Elm Ct, Apt 2B");
    assert_eq!(sent[0].body["waypoints"], "Burger Barn, 12 Main St");
    assert_eq!(sent[1].body["destination"], "34 Elm Ct, Apt 2B");
    assert!(sent[1].body.get("waypoints").is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn session_without_maps_key_reports_config_error() {
    let config = test_config("http://127.0.0.1:9", "ws://127.0.0.1:9");
    let (session, _events, _harness) = start_session(&config, false);
    let err = session
        .route(GeoPoint::new(0.0, 0.0))
        .await
        .expect_err("no client");
    assert!(matches!(err, AppError::Config(_)));
    session.shutdown().await;
}
