//! Unit tests for the active delivery state machine.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use dsp_courier::lifecycle::{DeliveryLifecycle, Destination, Screen, TransitionPolicy};
use dsp_courier::models::delivery::DeliveryStatus;
use dsp_courier::models::offer::Offer;
use dsp_courier::AppError;

fn offer(id: &str, pay: &str) -> Offer {
    Offer {
        id: id.to_owned(),
        pickup: "Taco Stand, 9 Pine Ave".to_owned(),
        dropoff: "88 Harbor Way".to_owned(),
        distance: "3.1 mi".to_owned(),
        pay: pay.to_owned(),
        items: "3x Taco".to_owned(),
        urgency: "Standard".to_owned(),
        counterpart_id: format!("customer-{id}"),
    }
}

fn noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).expect("valid time")
}

fn delivered_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 4)
        .and_then(|d| d.and_hms_opt(12, 20, 0))
        .expect("valid datetime")
}

#[test]
fn accept_sets_pickup_destination() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    let delivery = lifecycle
        .accept(&offer("n1", "$8.50"))
        .expect("accept")
        .expect("delivery");

    assert_eq!(delivery.status, DeliveryStatus::AcceptedEnRouteToPickup);
    assert_eq!(lifecycle.active_original_id(), Some("n1"));
    assert_eq!(
        lifecycle.destination(),
        Some(&Destination::Pickup("Taco Stand, 9 Pine Ave".to_owned()))
    );
    assert_eq!(lifecycle.screen(), Screen::ActiveDelivery);
}

#[test]
fn second_accept_is_rejected_under_strict_policy() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    lifecycle.accept(&offer("n1", "$8.50")).expect("first accept");

    let err = lifecycle.accept(&offer("n2", "$6.00")).expect_err("second accept");
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    assert_eq!(lifecycle.active_original_id(), Some("n1"));
}

#[test]
fn second_accept_is_ignored_under_lenient_policy() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Lenient);
    lifecycle.accept(&offer("n1", "$8.50")).expect("first accept");

    let outcome = lifecycle.accept(&offer("n2", "$6.00")).expect("lenient");
    assert!(outcome.is_none());
    assert_eq!(lifecycle.active_original_id(), Some("n1"));
}

#[test]
fn malformed_pay_is_refused_under_any_policy() {
    for policy in [TransitionPolicy::Strict, TransitionPolicy::Lenient] {
        let mut lifecycle = DeliveryLifecycle::new(policy);
        let err = lifecycle.accept(&offer("n1", "tbd")).expect_err("bad pay");
        assert!(matches!(err, AppError::Malformed(_)));
        assert!(lifecycle.active().is_none());
    }
}

#[test]
fn pickup_switches_destination_to_dropoff() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    lifecycle.accept(&offer("n1", "$8.50")).expect("accept");

    let delivery = lifecycle
        .confirm_pickup(noon())
        .expect("pickup")
        .expect("delivery");

    assert_eq!(delivery.status, DeliveryStatus::PickedUpEnRouteToCustomer);
    assert_eq!(delivery.pickup_time, Some(noon()));
    assert_eq!(
        lifecycle.destination(),
        Some(&Destination::Dropoff("88 Harbor Way".to_owned()))
    );
}

#[test]
fn pickup_without_delivery_fails_strictly() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    let err = lifecycle.confirm_pickup(noon()).expect_err("nothing active");
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}

#[test]
fn delivery_before_pickup_fails_strictly() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    lifecycle.accept(&offer("n1", "$8.50")).expect("accept");

    let err = lifecycle
        .confirm_delivery(delivered_at())
        .expect_err("pickup first");
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    assert_eq!(
        lifecycle.active().map(|d| d.status),
        Some(DeliveryStatus::AcceptedEnRouteToPickup)
    );
}

#[test]
fn delivery_before_pickup_is_ignored_leniently() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Lenient);
    lifecycle.accept(&offer("n1", "$8.50")).expect("accept");
    assert!(lifecycle
        .confirm_delivery(delivered_at())
        .expect("lenient")
        .is_none());
}

#[test]
fn delivery_produces_earnings_record() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    lifecycle.accept(&offer("n1", "$8.50")).expect("accept");
    lifecycle.confirm_pickup(noon()).expect("pickup");

    let completion = lifecycle
        .confirm_delivery(delivered_at())
        .expect("deliver")
        .expect("completion");

    assert_eq!(completion.delivery.status, DeliveryStatus::Delivered);
    assert_eq!(completion.delivery.delivery_time, Some(delivered_at()));
    assert!((completion.record.amount - 8.5).abs() < f64::EPSILON);
    assert_eq!(completion.record.items, "3x Taco");
    assert_eq!(completion.record.dropoff, "88 Harbor Way");
    assert_eq!(completion.record.completed_at, delivered_at());

    // Still held on screen until released.
    assert_eq!(lifecycle.screen(), Screen::ActiveDelivery);
    assert!(lifecycle.active().is_some());
}

#[test]
fn delivered_is_terminal() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    lifecycle.accept(&offer("n1", "$8.50")).expect("accept");
    lifecycle.confirm_pickup(noon()).expect("pickup");
    lifecycle.confirm_delivery(delivered_at()).expect("deliver");

    assert!(lifecycle.confirm_pickup(noon()).is_err());
    assert!(lifecycle.confirm_delivery(delivered_at()).is_err());
    assert!(lifecycle.accept(&offer("n2", "$5.00")).is_err());
}

#[test]
fn release_returns_to_idle() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    lifecycle.accept(&offer("n1", "$8.50")).expect("accept");
    lifecycle.confirm_pickup(noon()).expect("pickup");
    let completion = lifecycle
        .confirm_delivery(delivered_at())
        .expect("deliver")
        .expect("completion");

    let released = lifecycle.release(&completion.delivery.id).expect("released");
    assert_eq!(released.original_id, "n1");
    assert!(lifecycle.active().is_none());
    assert!(lifecycle.destination().is_none());
    assert_eq!(lifecycle.screen(), Screen::Offers);

    assert!(lifecycle.accept(&offer("n2", "$5.00")).expect("accept").is_some());
}

#[test]
fn release_ignores_undelivered_or_unknown_ids() {
    let mut lifecycle = DeliveryLifecycle::new(TransitionPolicy::Strict);
    let delivery = lifecycle
        .accept(&offer("n1", "$8.50"))
        .expect("accept")
        .expect("delivery");

    assert!(lifecycle.release(&delivery.id).is_none(), "not delivered yet");
    assert!(lifecycle.release("someone-else").is_none());
    assert!(lifecycle.active().is_some());
}
