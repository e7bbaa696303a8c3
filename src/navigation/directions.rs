//! Driving directions from the external mapping service.
//!
//! The service answers with an overview polyline and per-leg distance and
//! duration. Only the first route is used.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::config::MapsConfig;
use crate::models::location::GeoPoint;
use crate::navigation::polyline;
use crate::{AppError, Result};

/// One directions query: origin, destination and at most one waypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionsRequest {
    /// Start address or `lat,lng`.
    pub origin: String,
    /// End address or `lat,lng`.
    pub destination: String,
    /// Optional intermediate stop.
    pub waypoint: Option<String>,
}

impl DirectionsRequest {
    /// Route from `origin` to `destination`.
    #[must_use]
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            waypoint: None,
        }
    }

    /// Route through `waypoint`.
    #[must_use]
    pub fn via(mut self, waypoint: impl Into<String>) -> Self {
        self.waypoint = Some(waypoint.into());
        self
    }

    /// Query string pairs for the service, driving mode.
    #[must_use]
    pub fn query<'a>(&'a self, api_key: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut query = vec![
            ("origin", self.origin.as_str()),
            ("destination", self.destination.as_str()),
        ];
        if let Some(waypoint) = &self.waypoint {
            query.push(("waypoints", waypoint.as_str()));
        }
        query.push(("mode", "driving"));
        if !api_key.is_empty() {
            query.push(("key", api_key));
        }
        query
    }
}

/// Human text plus raw value, as the service reports distances and durations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TextValue {
    /// Display text, e.g. `"3.2 km"`.
    #[serde(default)]
    pub text: String,
    /// Meters or seconds.
    #[serde(default)]
    pub value: u64,
}

/// One leg between consecutive stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RouteLeg {
    /// Leg distance.
    #[serde(default)]
    pub distance: TextValue,
    /// Leg driving time.
    #[serde(default)]
    pub duration: TextValue,
    /// Resolved start address.
    #[serde(default)]
    pub start_address: String,
    /// Resolved end address.
    #[serde(default)]
    pub end_address: String,
}

/// Decoded route.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Overview path.
    pub path: Vec<GeoPoint>,
    /// Legs in travel order.
    pub legs: Vec<RouteLeg>,
}

impl Route {
    /// Total distance in meters.
    #[must_use]
    pub fn total_distance_meters(&self) -> u64 {
        self.legs.iter().map(|leg| leg.distance.value).sum()
    }

    /// Total duration.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.legs.iter().map(|leg| leg.duration.value).sum())
    }
}

#[derive(Debug, Default, Deserialize)]
struct OverviewPolyline {
    #[serde(default)]
    points: String,
}

#[derive(Debug, Default, Deserialize)]
struct RouteDto {
    #[serde(default)]
    overview_polyline: OverviewPolyline,
    #[serde(default)]
    legs: Vec<RouteLeg>,
}

/// Raw service response.
#[derive(Debug, Default, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<RouteDto>,
}

impl DirectionsResponse {
    /// Parse a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Malformed` if `body` is not JSON.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Decode the first route.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` for `ZERO_RESULTS` or an empty route list,
    /// `AppError::Unauthorized` for `REQUEST_DENIED`, `AppError::Http` for
    /// any other non-`OK` status, and `AppError::Malformed` for a bad
    /// polyline.
    pub fn into_route(self) -> Result<Route> {
        let detail = self.error_message.unwrap_or_default();
        match self.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" | "NOT_FOUND" => {
                return Err(AppError::NotFound(format!("no route: {}", self.status)))
            }
            "REQUEST_DENIED" => return Err(AppError::Unauthorized(format!("directions: {detail}"))),
            other => return Err(AppError::Http(format!("directions status {other}: {detail}"))),
        }

        let Some(route) = self.routes.into_iter().next() else {
            return Err(AppError::NotFound("no route returned".into()));
        };
        Ok(Route {
            path: polyline::decode(&route.overview_polyline.points)?,
            legs: route.legs,
        })
    }
}

/// Client for the directions endpoint.
#[derive(Debug, Clone)]
pub struct DirectionsClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl DirectionsClient {
    /// Build from maps configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &MapsConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Http(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            url: config.directions_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Request and decode a route.
    ///
    /// # Errors
    ///
    /// Transport failures map to `AppError::Http`; status handling follows
    /// [`DirectionsResponse::into_route`].
    pub async fn route(&self, request: &DirectionsRequest) -> Result<Route> {
        debug!(origin = %request.origin, destination = %request.destination, "directions request");
        let response = self
            .http
            .get(&self.url)
            .query(&request.query(&self.api_key))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Http(format!("directions: {status}")));
        }
        DirectionsResponse::from_json(&body)?.into_route()
    }
}
