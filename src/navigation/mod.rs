//! Routing to the current destination.

pub mod directions;
pub mod polyline;

pub use directions::{DirectionsClient, DirectionsRequest, Route};

use crate::lifecycle::Destination;
use crate::models::delivery::ActiveDelivery;
use crate::models::location::GeoPoint;

/// Directions query for the leg the driver is on.
///
/// While heading to pickup the route continues to the dropoff with the
/// pickup as waypoint, so the whole trip is previewed. After pickup it is
/// a direct route to the dropoff.
#[must_use]
pub fn plan_route(
    origin: GeoPoint,
    destination: &Destination,
    delivery: &ActiveDelivery,
) -> DirectionsRequest {
    let origin = format!("{},{}", origin.latitude, origin.longitude);
    match destination {
        Destination::Pickup(pickup) => {
            DirectionsRequest::new(origin, delivery.dropoff.clone()).via(pickup.clone())
        }
        Destination::Dropoff(dropoff) => DirectionsRequest::new(origin, dropoff.clone()),
    }
}
