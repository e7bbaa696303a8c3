//! Offer sources polled by the generation ticker.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::models::offer::Offer;
use crate::Result;

/// Produces at most one new offer per call.
///
/// `Ok(None)` means nothing new is available on this tick.
pub trait OfferSource: Send + Sync {
    /// Fetch the next offer.
    ///
    /// # Errors
    ///
    /// Implementations return `AppError::Http` / `AppError::Unauthorized`
    /// when the backing service cannot be reached.
    fn next_offer(&self) -> Pin<Box<dyn Future<Output = Result<Option<Offer>>> + Send + '_>>;

    /// Hand back an offer the feed had no room for so a later call yields
    /// it again. The default forgets it.
    fn requeue(&self, offer: Offer) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        drop(offer);
        Box::pin(async {})
    }
}

const PICKUPS: [&str; 5] = [
    "Burger Barn, 12 Main St",
    "Green Bowl, 480 Market Ave",
    "Pho Corner, 77 Lake Rd",
    "Taco Stand, 9 Harbor Blvd",
    "Bakery Lane, 215 Oak St",
];

const DROPOFFS: [&str; 5] = [
    "34 Elm Ct, Apt 2B",
    "1020 Pine St",
    "5 Riverside Dr",
    "88 Hillcrest Way",
    "401 Sunset Blvd, Unit 7",
];

const ITEMS: [&str; 5] = [
    "2x Cheeseburger, Fries",
    "Poke bowl",
    "Pho, Spring rolls",
    "3x Tacos al pastor",
    "Sourdough loaf, Croissants",
];

/// Local generator producing sample offers `n1`, `n2`, ….
#[derive(Debug, Default)]
pub struct SyntheticOffers {
    counter: AtomicU64,
    requeued: Mutex<VecDeque<Offer>>,
}

impl SyntheticOffers {
    /// Create a generator starting at `n1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the next sample offer synchronously.
    #[must_use]
    pub fn generate(&self) -> Offer {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        // Sample tables have five rows; the modulo keeps the index in range.
        #[allow(clippy::cast_possible_truncation)]
        let slot = (n % 5) as usize;
        #[allow(clippy::cast_precision_loss)]
        let tenths = (n % 7) as f64;

        Offer {
            id: format!("n{n}"),
            pickup: PICKUPS[slot].to_owned(),
            dropoff: DROPOFFS[(slot + 2) % 5].to_owned(),
            distance: format!("{:.1} mi", 1.2 + tenths * 0.4),
            pay: format!("${:.2}", 6.5 + tenths * 1.25),
            items: ITEMS[slot].to_owned(),
            urgency: if n % 4 == 0 { "Urgent" } else { "Standard" }.to_owned(),
            counterpart_id: format!("customer-n{n}"),
        }
    }
}

impl OfferSource for SyntheticOffers {
    fn next_offer(&self) -> Pin<Box<dyn Future<Output = Result<Option<Offer>>> + Send + '_>> {
        Box::pin(async move {
            if let Some(offer) = self.requeued.lock().await.pop_front() {
                return Ok(Some(offer));
            }
            Ok(Some(self.generate()))
        })
    }

    fn requeue(&self, offer: Offer) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { self.requeued.lock().await.push_back(offer) })
    }
}
