//! Active delivery model and lifecycle helpers.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::offer::Offer;

/// Lifecycle status for the active delivery.
///
/// The "no active delivery" state is represented by `Option::None` at the
/// owner, so it has no variant here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Offer accepted; driver heading to the pickup address.
    AcceptedEnRouteToPickup,
    /// Items collected; driver heading to the customer.
    PickedUpEnRouteToCustomer,
    /// Handed over; held on screen until released.
    Delivered,
}

impl DeliveryStatus {
    /// Wire status string understood by the order backend.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AcceptedEnRouteToPickup => "accepted",
            Self::PickedUpEnRouteToCustomer => "on_shipping",
            Self::Delivered => "delivered",
        }
    }
}

/// The single delivery currently being fulfilled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ActiveDelivery {
    /// Identifier of the active delivery.
    pub id: String,
    /// Identifier of the offer this delivery was accepted from.
    pub original_id: String,
    /// Current lifecycle status.
    pub status: DeliveryStatus,
    /// Pickup address.
    pub pickup: String,
    /// Dropoff address.
    pub dropoff: String,
    /// Display pay copied from the offer.
    pub pay: String,
    /// Item description.
    pub items: String,
    /// Time of day the pickup was confirmed.
    pub pickup_time: Option<NaiveTime>,
    /// Date and time the delivery was confirmed.
    pub delivery_time: Option<NaiveDateTime>,
    /// Chat counterpart correlated with this delivery.
    pub counterpart_id: String,
}

impl ActiveDelivery {
    /// Construct a freshly accepted delivery from an offer.
    #[must_use]
    pub fn from_offer(offer: &Offer) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            original_id: offer.id.clone(),
            status: DeliveryStatus::AcceptedEnRouteToPickup,
            pickup: offer.pickup.clone(),
            dropoff: offer.dropoff.clone(),
            pay: offer.pay.clone(),
            items: offer.items.clone(),
            pickup_time: None,
            delivery_time: None,
            counterpart_id: offer.counterpart_id.clone(),
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Transitions are linear and never move backwards.
    #[must_use]
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        matches!(
            (self.status, next),
            (
                DeliveryStatus::AcceptedEnRouteToPickup,
                DeliveryStatus::PickedUpEnRouteToCustomer
            ) | (
                DeliveryStatus::PickedUpEnRouteToCustomer,
                DeliveryStatus::Delivered
            )
        )
    }
}
