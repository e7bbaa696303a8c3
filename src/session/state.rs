//! Application state for one driver session.
//!
//! [`DispatchState`] composes the offer feed, the lifecycle controller and
//! the earnings ledger, and keeps the cross-cutting rules in one place:
//! the feed never surfaces the active delivery's offer, a delivered offer
//! is excluded for good, and the ledger receives exactly one record per
//! completed delivery.

use chrono::{NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use crate::config::GlobalConfig;
use crate::feed::{IngestOutcome, OfferFeed};
use crate::ledger::EarningsLedger;
use crate::lifecycle::{Completion, DeliveryLifecycle, Destination, Screen, TransitionPolicy};
use crate::models::delivery::{ActiveDelivery, DeliveryStatus};
use crate::models::earnings::EarningsRecord;
use crate::models::offer::Offer;
use crate::{AppError, Result};

/// Read-only copy of the state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Visible offers, excluding the one being fulfilled.
    pub offers: Vec<Offer>,
    /// Offers fetched but not shown.
    pub buffered: usize,
    /// Notification gate.
    pub notifications_enabled: bool,
    /// Active delivery, if any.
    pub active: Option<ActiveDelivery>,
    /// Navigation target.
    pub destination: Option<Destination>,
    /// Current view.
    pub screen: Screen,
    /// Lifetime earnings.
    pub earnings_total: f64,
    /// Earnings in the current Monday-to-Sunday week.
    pub week_total: f64,
    /// Newest completed deliveries first.
    pub recent: Vec<EarningsRecord>,
}

/// Feed, lifecycle and ledger for one driver.
#[derive(Debug)]
pub struct DispatchState {
    feed: OfferFeed,
    lifecycle: DeliveryLifecycle,
    ledger: EarningsLedger,
}

impl DispatchState {
    /// Empty state.
    #[must_use]
    pub fn new(max_backlog: usize, notifications_enabled: bool, policy: TransitionPolicy) -> Self {
        Self {
            feed: OfferFeed::new(max_backlog, notifications_enabled),
            lifecycle: DeliveryLifecycle::new(policy),
            ledger: EarningsLedger::new(),
        }
    }

    /// Empty state from configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.feed.max_backlog,
            config.feed.notifications_enabled,
            config.lifecycle.transition_policy,
        )
    }

    /// Seed the ledger with previously completed deliveries.
    #[must_use]
    pub fn with_ledger(mut self, ledger: EarningsLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// The offer feed.
    #[must_use]
    pub fn feed(&self) -> &OfferFeed {
        &self.feed
    }

    /// The lifecycle controller.
    #[must_use]
    pub fn lifecycle(&self) -> &DeliveryLifecycle {
        &self.lifecycle
    }

    /// The earnings ledger.
    #[must_use]
    pub fn ledger(&self) -> &EarningsLedger {
        &self.ledger
    }

    /// Apply a generated offer.
    pub fn ingest(&mut self, offer: Offer) -> IngestOutcome {
        let active = self.lifecycle.active_original_id().map(str::to_owned);
        self.feed.ingest(offer, active.as_deref())
    }

    /// Flip the notification gate; returns offers that became visible.
    pub fn set_notifications(&mut self, enabled: bool) -> Vec<Offer> {
        let active = self.lifecycle.active_original_id().map(str::to_owned);
        let surfaced = self.feed.set_notifications(enabled, active.as_deref());
        info!(enabled, surfaced = surfaced.len(), "notifications toggled");
        surfaced
    }

    /// The visible offer `offer_id` if it can be accepted now.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if the offer is not visible,
    /// `AppError::InvalidStateTransition` if a delivery is active (both
    /// softened to `Ok(None)` under the lenient policy), and
    /// `AppError::Malformed` for an unparseable pay string.
    pub fn acceptable(&self, offer_id: &str) -> Result<Option<Offer>> {
        let Some(offer) = self.visible_offer(offer_id) else {
            return self.soften(AppError::NotFound(format!("offer {offer_id} is not visible")));
        };
        if let Err(err) = self.lifecycle.check_accept(offer) {
            return self.soften(err);
        }
        Ok(Some(offer.clone()))
    }

    /// Accept the visible offer `offer_id`.
    ///
    /// # Errors
    ///
    /// See [`acceptable`](Self::acceptable).
    pub fn accept(&mut self, offer_id: &str) -> Result<Option<ActiveDelivery>> {
        let Some(offer) = self.acceptable(offer_id)? else {
            return Ok(None);
        };
        self.lifecycle.accept(&offer)
    }

    /// Whether `offer_id` can be rejected now.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if it is not visible (strict policy only).
    pub fn rejectable(&self, offer_id: &str) -> Result<bool> {
        if self.visible_offer(offer_id).is_some() {
            return Ok(true);
        }
        self.soften(AppError::NotFound(format!("offer {offer_id} is not visible")))
            .map(|_: Option<()>| false)
    }

    /// Reject a visible offer, excluding it permanently. The active
    /// delivery is unaffected.
    ///
    /// # Errors
    ///
    /// See [`rejectable`](Self::rejectable).
    pub fn reject(&mut self, offer_id: &str) -> Result<bool> {
        if !self.rejectable(offer_id)? {
            return Ok(false);
        }
        let removed = self.feed.reject(offer_id);
        debug!(offer_id, removed, "offer rejected");
        Ok(removed)
    }

    /// The active delivery if it can move to `next`.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidStateTransition` under the strict policy.
    pub fn advanceable(&self, next: DeliveryStatus) -> Result<Option<ActiveDelivery>> {
        match self.lifecycle.check_advance(next) {
            Ok(active) => Ok(Some(active.clone())),
            Err(err) => self.soften(err),
        }
    }

    /// Confirm pickup at `now`.
    ///
    /// # Errors
    ///
    /// See [`DeliveryLifecycle::confirm_pickup`].
    pub fn confirm_pickup(&mut self, now: NaiveTime) -> Result<Option<ActiveDelivery>> {
        self.lifecycle.confirm_pickup(now)
    }

    /// Confirm delivery at `now`: records earnings and excludes the
    /// originating offer from the feed for good.
    ///
    /// # Errors
    ///
    /// See [`DeliveryLifecycle::confirm_delivery`].
    pub fn confirm_delivery(&mut self, now: NaiveDateTime) -> Result<Option<Completion>> {
        let Some(completion) = self.lifecycle.confirm_delivery(now)? else {
            return Ok(None);
        };
        self.ledger.record(completion.record.clone());
        self.feed.exclude(&completion.delivery.original_id);
        Ok(Some(completion))
    }

    /// End the display hold of `delivery_id`. Returns the released delivery
    /// and any offers the reconciliation surfaced.
    pub fn release(&mut self, delivery_id: &str) -> Option<(ActiveDelivery, Vec<Offer>)> {
        let released = self.lifecycle.release(delivery_id)?;
        let surfaced = self.feed.reconcile(None);
        Some((released, surfaced))
    }

    /// Snapshot for rendering at `now`.
    #[must_use]
    pub fn snapshot(&self, now: NaiveDateTime, recent: usize) -> StateSnapshot {
        let active_id = self.lifecycle.active_original_id();
        StateSnapshot {
            offers: self.feed.pending(active_id).cloned().collect(),
            buffered: self
                .feed
                .backlog()
                .len()
                .saturating_sub(self.feed.visible().len()),
            notifications_enabled: self.feed.notifications_enabled(),
            active: self.lifecycle.active().cloned(),
            destination: self.lifecycle.destination().cloned(),
            screen: self.lifecycle.screen(),
            earnings_total: self.ledger.total(),
            week_total: self.ledger.week_total(now),
            recent: self.ledger.recent(recent).to_vec(),
        }
    }

    fn visible_offer(&self, offer_id: &str) -> Option<&Offer> {
        let active = self.lifecycle.active_original_id();
        self.feed
            .find_visible(offer_id)
            .filter(|offer| Some(offer.id.as_str()) != active)
    }

    fn soften<T>(&self, err: AppError) -> Result<Option<T>> {
        match (self.lifecycle.policy(), err) {
            (
                TransitionPolicy::Lenient,
                AppError::InvalidStateTransition(reason) | AppError::NotFound(reason),
            ) => {
                debug!(reason, "ignoring action");
                Ok(None)
            }
            (_, err) => Err(err),
        }
    }
}
