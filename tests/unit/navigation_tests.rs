//! Unit tests for polyline decoding, directions parsing and route planning.

use std::time::Duration;

use dsp_courier::lifecycle::Destination;
use dsp_courier::models::delivery::ActiveDelivery;
use dsp_courier::models::location::GeoPoint;
use dsp_courier::models::offer::Offer;
use dsp_courier::navigation::directions::DirectionsResponse;
use dsp_courier::navigation::{plan_route, polyline, DirectionsRequest};
use dsp_courier::AppError;

const SAMPLE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn decodes_reference_polyline() {
    let points = polyline::decode(SAMPLE).expect("decode");
    let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];

    assert_eq!(points.len(), expected.len());
    for (point, (lat, lng)) in points.iter().zip(expected) {
        assert!(close(point.latitude, lat), "lat {} vs {lat}", point.latitude);
        assert!(close(point.longitude, lng), "lng {} vs {lng}", point.longitude);
    }
}

#[test]
fn empty_polyline_is_empty_path() {
    assert!(polyline::decode("").expect("decode").is_empty());
}

#[test]
fn malformed_polylines_are_rejected() {
    // Character below the encoding range.
    assert!(matches!(polyline::decode("_p~iF ps|U"), Err(AppError::Malformed(_))));
    // Chunk with the continuation bit set and nothing after it.
    assert!(matches!(polyline::decode("_p~i"), Err(AppError::Malformed(_))));
    // Latitude without a longitude.
    assert!(matches!(polyline::decode("_p~iF"), Err(AppError::Malformed(_))));
}

fn ok_body() -> String {
    format!(
        r#"{{
  "status": "OK",
  "routes": [{{
    "overview_polyline": {{"points": "{SAMPLE}"}},
    "legs": [
      {{"distance": {{"text": "1.2 km", "value": 1200}}, "duration": {{"text": "4 mins", "value": 240}},
        "start_address": "A", "end_address": "B"}},
      {{"distance": {{"text": "0.8 km", "value": 800}}, "duration": {{"text": "3 mins", "value": 180}},
        "start_address": "B", "end_address": "C"}}
    ]
  }}]
}}"#
    )
}

#[test]
fn ok_response_yields_route() {
    let route = DirectionsResponse::from_json(&ok_body())
        .expect("json")
        .into_route()
        .expect("route");

    assert_eq!(route.path.len(), 3);
    assert_eq!(route.legs.len(), 2);
    assert_eq!(route.total_distance_meters(), 2000);
    assert_eq!(route.total_duration(), Duration::from_secs(420));
    assert_eq!(route.legs[1].end_address, "C");
}

#[test]
fn status_codes_map_to_errors() {
    let parse = |body: &str| {
        DirectionsResponse::from_json(body)
            .expect("json")
            .into_route()
            .expect_err("must fail")
    };

    assert!(matches!(parse(r#"{"status":"ZERO_RESULTS"}"#), AppError::NotFound(_)));
    assert!(matches!(parse(r#"{"status":"NOT_FOUND"}"#), AppError::NotFound(_)));
    assert!(matches!(
        parse(r#"{"status":"REQUEST_DENIED","error_message":"bad key"}"#),
        AppError::Unauthorized(ref msg) if msg.contains("bad key")
    ));
    assert!(matches!(parse(r#"{"status":"OVER_QUERY_LIMIT"}"#), AppError::Http(_)));
    assert!(matches!(parse(r#"{"status":"OK","routes":[]}"#), AppError::NotFound(_)));
}

#[test]
fn non_json_body_is_malformed() {
    assert!(matches!(
        DirectionsResponse::from_json("<html>"),
        Err(AppError::Malformed(_))
    ));
}

#[test]
fn query_includes_waypoint_and_key_when_present() {
    let request = DirectionsRequest::new("1,2", "Door").via("Kitchen");
    assert_eq!(
        request.query("k"),
        [
            ("origin", "1,2"),
            ("destination", "Door"),
            ("waypoints", "Kitchen"),
            ("mode", "driving"),
            ("key", "k"),
        ]
    );

    let direct = DirectionsRequest::new("1,2", "Door");
    assert_eq!(
        direct.query(""),
        [("origin", "1,2"), ("destination", "Door"), ("mode", "driving")]
    );
}

fn delivery() -> ActiveDelivery {
    ActiveDelivery::from_offer(&Offer {
        id: "n1".into(),
        pickup: "Kitchen".into(),
        dropoff: "Door".into(),
        distance: "1 mi".into(),
        pay: "$8.50".into(),
        items: "Soup".into(),
        urgency: "Standard".into(),
        counterpart_id: "customer-n1".into(),
    })
}

#[test]
fn pickup_leg_previews_whole_trip() {
    let request = plan_route(
        GeoPoint::new(1.5, -2.25),
        &Destination::Pickup("Kitchen".into()),
        &delivery(),
    );
    assert_eq!(request.origin, "1.5,-2.25");
    assert_eq!(request.destination, "Door");
    assert_eq!(request.waypoint.as_deref(), Some("Kitchen"));
}

#[test]
fn dropoff_leg_is_direct() {
    let request = plan_route(
        GeoPoint::new(1.5, -2.25),
        &Destination::Dropoff("Door".into()),
        &delivery(),
    );
    assert_eq!(request.destination, "Door");
    assert!(request.waypoint.is_none());
}
