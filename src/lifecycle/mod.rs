//! Active delivery state machine.
//!
//! `None → AcceptedEnRouteToPickup → PickedUpEnRouteToCustomer → Delivered`,
//! then back to `None` once the delivered hold is released. Transitions
//! never move backwards and at most one delivery is active at a time.
//!
//! Whether an out-of-order action is an error or a logged no-op is decided
//! by [`TransitionPolicy`].

use chrono::{NaiveDateTime, NaiveTime};
use serde::Deserialize;
use tracing::{debug, info};

use crate::models::delivery::{ActiveDelivery, DeliveryStatus};
use crate::models::earnings::EarningsRecord;
use crate::models::offer::{parse_pay, Offer};
use crate::{AppError, Result};

/// Handling of actions that the current state does not permit.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Return `AppError::InvalidStateTransition`.
    #[default]
    Strict,
    /// Log and ignore; the operation returns `Ok(None)`.
    Lenient,
}

/// Where the driver should be navigating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Heading to the pickup address.
    Pickup(String),
    /// Heading to the dropoff address.
    Dropoff(String),
}

impl Destination {
    /// Address of the destination.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::Pickup(addr) | Self::Dropoff(addr) => addr,
        }
    }
}

/// Which top-level view the UI should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    /// Offer list / dashboard.
    #[default]
    Offers,
    /// Active delivery card with navigation.
    ActiveDelivery,
}

/// Outcome of confirming a delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Delivery snapshot in the `Delivered` state.
    pub delivery: ActiveDelivery,
    /// Earnings record to prepend to the ledger.
    pub record: EarningsRecord,
}

/// Owner of the single active delivery and its navigation target.
#[derive(Debug, Clone, Default)]
pub struct DeliveryLifecycle {
    active: Option<ActiveDelivery>,
    destination: Option<Destination>,
    screen: Screen,
    policy: TransitionPolicy,
}

impl DeliveryLifecycle {
    /// Create an idle lifecycle.
    #[must_use]
    pub fn new(policy: TransitionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The active delivery, if any.
    #[must_use]
    pub fn active(&self) -> Option<&ActiveDelivery> {
        self.active.as_ref()
    }

    /// Identifier of the offer being fulfilled.
    #[must_use]
    pub fn active_original_id(&self) -> Option<&str> {
        self.active.as_ref().map(|d| d.original_id.as_str())
    }

    /// Current navigation target.
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Current top-level view.
    #[must_use]
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Configured policy.
    #[must_use]
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Check that `offer` may be accepted right now without changing state.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` if a delivery is already active,
    /// `AppError::Malformed` if the offer's pay cannot be parsed.
    pub fn check_accept(&self, offer: &Offer) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(AppError::InvalidStateTransition(format!(
                "delivery {} is already active",
                active.id
            )));
        }
        parse_pay(&offer.pay)?;
        Ok(())
    }

    /// Accept `offer`, making it the active delivery.
    ///
    /// # Errors
    ///
    /// See [`check_accept`](Self::check_accept); the state error is
    /// swallowed under [`TransitionPolicy::Lenient`].
    pub fn accept(&mut self, offer: &Offer) -> Result<Option<ActiveDelivery>> {
        if let Err(err) = self.check_accept(offer) {
            return self.deny(err);
        }

        let delivery = ActiveDelivery::from_offer(offer);
        self.destination = Some(Destination::Pickup(delivery.pickup.clone()));
        self.screen = Screen::ActiveDelivery;
        info!(offer_id = %offer.id, delivery_id = %delivery.id, "offer accepted");
        self.active = Some(delivery.clone());
        Ok(Some(delivery))
    }

    /// Check that the active delivery can move to `next`.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` when no delivery is active or the
    /// active one is not in the preceding state.
    pub fn check_advance(&self, next: DeliveryStatus) -> Result<&ActiveDelivery> {
        let Some(active) = &self.active else {
            return Err(AppError::InvalidStateTransition(format!(
                "no active delivery to move to {}",
                next.as_str()
            )));
        };
        if !active.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition(format!(
                "delivery {} cannot move from {} to {}",
                active.id,
                active.status.as_str(),
                next.as_str()
            )));
        }
        Ok(active)
    }

    /// Confirm pickup at time-of-day `now`.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` unless the delivery is
    /// `AcceptedEnRouteToPickup` (strict policy only).
    pub fn confirm_pickup(&mut self, now: NaiveTime) -> Result<Option<ActiveDelivery>> {
        if let Err(err) = self.check_advance(DeliveryStatus::PickedUpEnRouteToCustomer) {
            return self.deny(err);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };

        active.status = DeliveryStatus::PickedUpEnRouteToCustomer;
        active.pickup_time = Some(now);
        self.destination = Some(Destination::Dropoff(active.dropoff.clone()));
        info!(delivery_id = %active.id, "pickup confirmed");
        Ok(Some(active.clone()))
    }

    /// Confirm delivery at `now`, producing the earnings record.
    ///
    /// The delivery stays in `Delivered` until [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` unless the delivery is
    /// `PickedUpEnRouteToCustomer` (strict policy only).
    pub fn confirm_delivery(&mut self, now: NaiveDateTime) -> Result<Option<Completion>> {
        if let Err(err) = self.check_advance(DeliveryStatus::Delivered) {
            return self.deny(err);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };

        let amount = parse_pay(&active.pay)?;
        active.status = DeliveryStatus::Delivered;
        active.delivery_time = Some(now);
        let record = EarningsRecord::new(active.items.clone(), active.dropoff.clone(), amount, now);
        info!(delivery_id = %active.id, amount, "delivery confirmed");

        Ok(Some(Completion {
            delivery: active.clone(),
            record,
        }))
    }

    /// Clear a delivered delivery after its display hold.
    ///
    /// Only releases when the active delivery is still `delivery_id` and
    /// `Delivered`; returns the released delivery.
    pub fn release(&mut self, delivery_id: &str) -> Option<ActiveDelivery> {
        let matches = self
            .active
            .as_ref()
            .is_some_and(|d| d.id == delivery_id && d.status == DeliveryStatus::Delivered);
        if !matches {
            return None;
        }
        self.destination = None;
        self.screen = Screen::Offers;
        debug!(delivery_id, "delivery released");
        self.active.take()
    }

    /// Apply the policy to a failed precondition. Only state errors are
    /// softened; anything else propagates.
    fn deny<T>(&self, err: AppError) -> Result<Option<T>> {
        match (self.policy, err) {
            (TransitionPolicy::Lenient, AppError::InvalidStateTransition(reason)) => {
                debug!(reason, "ignoring invalid transition");
                Ok(None)
            }
            (_, err) => Err(err),
        }
    }
}
