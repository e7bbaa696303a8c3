//! Unit tests for the offer feed: gate, backlog cap, reconciliation and
//! permanent exclusion.

use std::collections::HashSet;

use dsp_courier::feed::{IngestOutcome, OfferFeed};
use dsp_courier::models::offer::Offer;

fn offer(id: &str) -> Offer {
    Offer {
        id: id.to_owned(),
        pickup: "Pho Corner, 77 Lake Rd".to_owned(),
        dropoff: "5 Riverside Dr".to_owned(),
        distance: "1.6 mi".to_owned(),
        pay: "$7.00".to_owned(),
        items: "Pho".to_owned(),
        urgency: "Standard".to_owned(),
        counterpart_id: format!("customer-{id}"),
    }
}

fn ids(offers: &[Offer]) -> Vec<&str> {
    offers.iter().map(|o| o.id.as_str()).collect()
}

#[test]
fn gate_on_surfaces_new_offers() {
    let mut feed = OfferFeed::new(10, true);
    assert_eq!(feed.ingest(offer("n1"), None), IngestOutcome::Surfaced);
    assert_eq!(ids(feed.visible()), ["n1"]);
    assert_eq!(ids(feed.backlog()), ["n1"]);
}

#[test]
fn gate_off_buffers_new_offers() {
    let mut feed = OfferFeed::new(10, false);
    assert_eq!(feed.ingest(offer("n1"), None), IngestOutcome::Buffered);
    assert!(feed.visible().is_empty());
    assert_eq!(ids(feed.backlog()), ["n1"]);
}

#[test]
fn active_offer_is_not_surfaced() {
    let mut feed = OfferFeed::new(10, true);
    assert_eq!(feed.ingest(offer("n1"), Some("n1")), IngestOutcome::Buffered);
    assert!(feed.visible().is_empty());
}

#[test]
fn backlog_is_capped() {
    let mut feed = OfferFeed::new(2, true);
    feed.ingest(offer("n1"), None);
    feed.ingest(offer("n2"), None);
    assert!(feed.is_full());
    assert_eq!(feed.ingest(offer("n3"), None), IngestOutcome::BacklogFull);
    assert_eq!(ids(feed.backlog()), ["n1", "n2"]);
}

#[test]
fn duplicate_ids_are_ignored() {
    let mut feed = OfferFeed::new(10, true);
    feed.ingest(offer("n1"), None);
    assert_eq!(feed.ingest(offer("n1"), None), IngestOutcome::Duplicate);
    assert_eq!(feed.backlog().len(), 1);
    assert_eq!(feed.visible().len(), 1);
}

#[test]
fn toggling_gate_on_reveals_exactly_the_missing_offers() {
    let mut feed = OfferFeed::new(10, true);
    feed.ingest(offer("n1"), None);
    feed.set_notifications(false, None);
    feed.ingest(offer("n2"), None);
    feed.ingest(offer("n3"), None);
    feed.ingest(offer("n4"), None);

    let surfaced = feed.set_notifications(true, Some("n3"));

    assert_eq!(ids(&surfaced), ["n2", "n4"]);
    let visible: HashSet<&str> = feed.visible().iter().map(|o| o.id.as_str()).collect();
    assert_eq!(visible, HashSet::from(["n1", "n2", "n4"]));
    assert_eq!(visible.len(), feed.visible().len(), "no duplicates");
}

#[test]
fn repeated_toggles_never_duplicate() {
    let mut feed = OfferFeed::new(10, false);
    feed.ingest(offer("n1"), None);
    feed.ingest(offer("n2"), None);
    for _ in 0..3 {
        feed.set_notifications(true, None);
        feed.set_notifications(false, None);
    }
    feed.set_notifications(true, None);
    assert_eq!(ids(feed.visible()), ["n1", "n2"]);
}

#[test]
fn gate_off_keeps_current_visible_list() {
    let mut feed = OfferFeed::new(10, true);
    feed.ingest(offer("n1"), None);
    let surfaced = feed.set_notifications(false, None);
    assert!(surfaced.is_empty());
    assert_eq!(ids(feed.visible()), ["n1"]);
    assert!(!feed.notifications_enabled());
}

#[test]
fn reconcile_is_noop_while_gate_closed() {
    let mut feed = OfferFeed::new(10, false);
    feed.ingest(offer("n1"), None);
    assert!(feed.reconcile(None).is_empty());
    assert!(feed.visible().is_empty());
}

#[test]
fn reject_removes_offer_for_good() {
    let mut feed = OfferFeed::new(10, true);
    feed.ingest(offer("n1"), None);
    feed.ingest(offer("n2"), None);

    assert!(feed.reject("n1"));
    assert_eq!(ids(feed.visible()), ["n2"]);
    assert_eq!(ids(feed.backlog()), ["n2"]);
    assert!(feed.is_excluded("n1"));

    assert_eq!(feed.ingest(offer("n1"), None), IngestOutcome::Duplicate);
    feed.set_notifications(false, None);
    feed.set_notifications(true, None);
    assert!(feed.find_visible("n1").is_none());
}

#[test]
fn reject_of_buffered_offer_is_refused() {
    let mut feed = OfferFeed::new(10, false);
    feed.ingest(offer("n1"), None);
    assert!(!feed.reject("n1"));
    assert_eq!(ids(feed.backlog()), ["n1"]);
}

#[test]
fn exclusion_frees_backlog_capacity() {
    let mut feed = OfferFeed::new(1, true);
    feed.ingest(offer("n1"), None);
    feed.exclude("n1");
    assert_eq!(feed.ingest(offer("n2"), None), IngestOutcome::Surfaced);
}

#[test]
fn pending_hides_active_offer() {
    let mut feed = OfferFeed::new(10, true);
    feed.ingest(offer("n1"), None);
    feed.ingest(offer("n2"), None);
    let pending: Vec<&str> = feed.pending(Some("n1")).map(|o| o.id.as_str()).collect();
    assert_eq!(pending, ["n2"]);
}
