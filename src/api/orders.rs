//! Order endpoints and their conversion into feed offers.
//!
//! The backend returns loosely shaped order documents: nested merchant,
//! customer and location objects may be missing or partial. [`OrderDto`]
//! declares every field optional with defaults so validation happens once,
//! here, instead of throughout the core.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::feed::source::OfferSource;
use crate::models::offer::Offer;
use crate::{AppError, Result};

/// Order status change posted to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    /// Driver accepted the order.
    Accept,
    /// Driver declined the order.
    Reject,
    /// Items picked up; order is on its way.
    OnShipping,
    /// Order handed to the customer.
    Delivered,
}

impl OrderAction {
    /// Path segment after `/orders/{id}/`.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Accept => "dsp-accept",
            Self::Reject => "dsp-reject",
            Self::OnShipping => "dsp-on-shipping",
            Self::Delivered => "delivered",
        }
    }

    /// Target status carried in the request body.
    #[must_use]
    pub fn target_status(self) -> &'static str {
        match self {
            Self::Accept => "accepted",
            Self::Reject => "rejected",
            Self::OnShipping => "on_shipping",
            Self::Delivered => "delivered",
        }
    }
}

/// Pushes lifecycle changes to the order backend.
pub trait OrderSync: Send + Sync {
    /// Post `action` for `order_id`.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    fn update(
        &self,
        order_id: &str,
        action: OrderAction,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Party embedded in an order (merchant or customer).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PartyDto {
    /// Party user id.
    #[serde(alias = "_id")]
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Street address.
    pub address: Option<String>,
}

/// Location block embedded in an order.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderLocationDto {
    /// Pickup address, when different from the merchant address.
    pub pickup_address: Option<String>,
    /// Dropoff address, when different from the customer address.
    pub dropoff_address: Option<String>,
    /// Distance in kilometres.
    pub distance_km: Option<f64>,
}

/// One ordered item.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderItemDto {
    /// Product name.
    pub name: String,
    /// Quantity ordered.
    pub quantity: Option<u32>,
}

/// Order document as returned by `GET /dsp/orders`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderDto {
    /// Order id.
    #[serde(alias = "_id")]
    pub id: Option<String>,
    /// Merchant placing the order.
    pub merchant: Option<PartyDto>,
    /// Customer receiving the order.
    pub customer: Option<PartyDto>,
    /// Addresses and distance.
    pub location: Option<OrderLocationDto>,
    /// Items in the order.
    pub items: Vec<OrderItemDto>,
    /// Delivery fee paid to the driver.
    pub delivery_fee: Option<f64>,
    /// Priority flag.
    pub priority: Option<String>,
    /// Backend status string.
    pub status: Option<String>,
}

/// `GET /dsp/orders` envelope; accepts a bare array or `{ "orders": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrdersEnvelope {
    Bare(Vec<OrderDto>),
    Wrapped {
        #[serde(default)]
        orders: Vec<OrderDto>,
    },
}

impl OrderDto {
    /// Convert into an [`Offer`], or `None` when the order lacks an id or
    /// any usable address.
    #[must_use]
    pub fn into_offer(self) -> Option<Offer> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let merchant = self.merchant.unwrap_or_default();
        let customer = self.customer.unwrap_or_default();
        let location = self.location.unwrap_or_default();

        let pickup = location.pickup_address.or(merchant.address)?;
        let dropoff = location.dropoff_address.or(customer.address)?;

        let items = if self.items.is_empty() {
            "Order".to_owned()
        } else {
            self.items
                .iter()
                .map(|item| match item.quantity {
                    Some(q) if q > 1 => format!("{q}x {}", item.name),
                    _ => item.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let counterpart_id = customer
            .id
            .or(merchant.id)
            .unwrap_or_else(|| format!("customer-{id}"));

        Some(Offer {
            pickup,
            dropoff,
            distance: location
                .distance_km
                .map_or_else(|| "n/a".to_owned(), |km| format!("{km:.1} km")),
            pay: format!("${:.2}", self.delivery_fee.unwrap_or(0.0)),
            items,
            urgency: self.priority.unwrap_or_else(|| "Standard".to_owned()),
            counterpart_id,
            id,
        })
    }
}

/// Order endpoints.
#[derive(Debug, Clone)]
pub struct OrdersApi {
    client: ApiClient,
}

impl OrdersApi {
    /// Wrap an authenticated client.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `GET /dsp/orders`, dropping orders that cannot become offers.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    pub async fn list_offers(&self) -> Result<Vec<Offer>> {
        let envelope: OrdersEnvelope = self.client.get_json("/dsp/orders").await?;
        let orders = match envelope {
            OrdersEnvelope::Bare(orders) | OrdersEnvelope::Wrapped { orders } => orders,
        };
        let total = orders.len();
        let offers: Vec<Offer> = orders.into_iter().filter_map(OrderDto::into_offer).collect();
        if offers.len() < total {
            warn!(
                skipped = total - offers.len(),
                "orders without id or address skipped"
            );
        }
        Ok(offers)
    }

    /// `POST /orders/{id}/{action}` with `{ "status": … }`.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    pub async fn post_action(&self, order_id: &str, action: OrderAction) -> Result<()> {
        if order_id.is_empty() {
            return Err(AppError::NotFound("empty order id".into()));
        }
        let body = StatusBody {
            status: action.target_status(),
        };
        self.client
            .post_unit(
                &format!("/orders/{order_id}/{}", action.path_segment()),
                &body,
            )
            .await?;
        debug!(order_id, action = action.target_status(), "order updated");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

impl OrderSync for OrdersApi {
    fn update(
        &self,
        order_id: &str,
        action: OrderAction,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let order_id = order_id.to_owned();
        Box::pin(async move { self.post_action(&order_id, action).await })
    }
}

/// Offer source polling the order backend.
///
/// Each order is yielded once. An order handed back through
/// [`OfferSource::requeue`] counts as unseen again.
#[derive(Debug)]
pub struct BackendOffers {
    api: OrdersApi,
    seen: Mutex<HashSet<String>>,
}

impl BackendOffers {
    /// Poll `api` for new orders.
    #[must_use]
    pub fn new(api: OrdersApi) -> Self {
        Self {
            api,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl OfferSource for BackendOffers {
    fn next_offer(&self) -> Pin<Box<dyn Future<Output = Result<Option<Offer>>> + Send + '_>> {
        Box::pin(async move {
            let offers = self.api.list_offers().await?;
            let mut seen = self.seen.lock().await;
            Ok(offers.into_iter().find(|offer| seen.insert(offer.id.clone())))
        })
    }

    fn requeue(&self, offer: Offer) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            debug!(order_id = %offer.id, "order returned to the unseen set");
            self.seen.lock().await.remove(&offer.id);
        })
    }
}
