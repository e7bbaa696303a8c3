//! Location telemetry endpoint.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::api::ApiClient;
use crate::location::LocationSink;
use crate::models::location::GeoPoint;
use crate::Result;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocationBody<'a> {
    user_id: &'a str,
    latitude: f64,
    longitude: f64,
}

/// REST-backed [`LocationSink`] posting to `/dsp/location`.
#[derive(Debug, Clone)]
pub struct LocationApi {
    client: ApiClient,
}

impl LocationApi {
    /// Wrap an authenticated client.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `POST /dsp/location`.
    ///
    /// # Errors
    ///
    /// Returns the mapped backend failure.
    pub async fn post(&self, user_id: &str, point: GeoPoint) -> Result<()> {
        self.client
            .post_unit(
                "/dsp/location",
                &LocationBody {
                    user_id,
                    latitude: point.latitude,
                    longitude: point.longitude,
                },
            )
            .await
    }
}

impl LocationSink for LocationApi {
    fn push<'a>(
        &'a self,
        user_id: &'a str,
        point: GeoPoint,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.post(user_id, point))
    }
}
