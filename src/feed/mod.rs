//! Delivery offer feed: backlog, visible list and notification gate.
//!
//! The backlog holds every offer fetched so far (bounded by `max_backlog`);
//! `visible` is the subset shown to the driver. The gate decides whether
//! newly buffered offers are surfaced. Identifiers that were rejected or
//! delivered are remembered in an exclusion set and can never re-enter
//! either collection.

pub mod source;
pub mod ticker;

use std::collections::HashSet;

use tracing::debug;

use crate::models::offer::Offer;

/// Result of feeding one generated offer into the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Added to the backlog and shown to the driver.
    Surfaced,
    /// Added to the backlog only (gate closed or offer is being fulfilled).
    Buffered,
    /// Backlog already at capacity; the offer was not admitted.
    BacklogFull,
    /// Identifier already known or permanently excluded.
    Duplicate,
}

/// Backlog plus visible list with the notification gate.
#[derive(Debug, Clone)]
pub struct OfferFeed {
    backlog: Vec<Offer>,
    visible: Vec<Offer>,
    /// Rejected and delivered ids. Scoped to the session that owns the
    /// feed and never trimmed, since exclusion is permanent.
    excluded: HashSet<String>,
    notifications_enabled: bool,
    max_backlog: usize,
}

impl OfferFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new(max_backlog: usize, notifications_enabled: bool) -> Self {
        Self {
            backlog: Vec::new(),
            visible: Vec::new(),
            excluded: HashSet::new(),
            notifications_enabled,
            max_backlog,
        }
    }

    /// Every buffered offer, in fetch order.
    #[must_use]
    pub fn backlog(&self) -> &[Offer] {
        &self.backlog
    }

    /// Offers currently shown, in surfacing order.
    #[must_use]
    pub fn visible(&self) -> &[Offer] {
        &self.visible
    }

    /// Visible offers minus the one currently being fulfilled.
    pub fn pending<'a>(&'a self, active_original_id: Option<&'a str>) -> impl Iterator<Item = &'a Offer> {
        self.visible
            .iter()
            .filter(move |o| Some(o.id.as_str()) != active_original_id)
    }

    /// Look up a visible offer by id.
    #[must_use]
    pub fn find_visible(&self, offer_id: &str) -> Option<&Offer> {
        self.visible.iter().find(|o| o.id == offer_id)
    }

    /// Current gate state.
    #[must_use]
    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    /// Whether the backlog reached its cap.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.backlog.len() >= self.max_backlog
    }

    /// Whether `offer_id` was rejected or delivered.
    #[must_use]
    pub fn is_excluded(&self, offer_id: &str) -> bool {
        self.excluded.contains(offer_id)
    }

    /// Apply one generation tick.
    pub fn ingest(&mut self, offer: Offer, active_original_id: Option<&str>) -> IngestOutcome {
        if self.excluded.contains(&offer.id) || self.backlog.iter().any(|o| o.id == offer.id) {
            return IngestOutcome::Duplicate;
        }
        if self.is_full() {
            debug!(offer_id = %offer.id, "backlog full, dropping offer");
            return IngestOutcome::BacklogFull;
        }

        let surface =
            self.notifications_enabled && Some(offer.id.as_str()) != active_original_id;
        if surface {
            self.visible.push(offer.clone());
        }
        self.backlog.push(offer);

        if surface {
            IngestOutcome::Surfaced
        } else {
            IngestOutcome::Buffered
        }
    }

    /// Flip the gate. Turning it on reconciles immediately and returns the
    /// offers that became visible; turning it off leaves `visible` as is.
    pub fn set_notifications(
        &mut self,
        enabled: bool,
        active_original_id: Option<&str>,
    ) -> Vec<Offer> {
        self.notifications_enabled = enabled;
        if enabled {
            self.reconcile(active_original_id)
        } else {
            Vec::new()
        }
    }

    /// `visible = visible ∪ (backlog − visible − {active})`, deduplicated by id.
    ///
    /// No-op while the gate is closed. Returns the newly surfaced offers.
    pub fn reconcile(&mut self, active_original_id: Option<&str>) -> Vec<Offer> {
        if !self.notifications_enabled {
            return Vec::new();
        }

        let mut seen: HashSet<String> = self.visible.iter().map(|o| o.id.clone()).collect();
        let mut surfaced = Vec::new();
        for offer in &self.backlog {
            if Some(offer.id.as_str()) == active_original_id {
                continue;
            }
            if seen.insert(offer.id.clone()) {
                surfaced.push(offer.clone());
            }
        }
        self.visible.extend(surfaced.iter().cloned());
        surfaced
    }

    /// Remove a visible offer permanently. Returns `false` when the offer
    /// is not currently visible.
    pub fn reject(&mut self, offer_id: &str) -> bool {
        if self.find_visible(offer_id).is_none() {
            return false;
        }
        self.exclude(offer_id);
        true
    }

    /// Permanently drop `offer_id` from both collections.
    pub fn exclude(&mut self, offer_id: &str) {
        self.excluded.insert(offer_id.to_owned());
        self.backlog.retain(|o| o.id != offer_id);
        self.visible.retain(|o| o.id != offer_id);
    }
}
