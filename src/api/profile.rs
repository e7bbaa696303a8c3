//! Driver profile lookups.

use serde::{Deserialize, Serialize};

use crate::api::ApiClient;
use crate::Result;

/// Driver or user profile. Unknown fields are ignored and missing ones
/// default to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    /// User id.
    #[serde(alias = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Vehicle description.
    pub vehicle: Option<String>,
    /// Average rating.
    pub rating: Option<f64>,
}

/// Some endpoints wrap the profile in `{ "user": … }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { user: Profile },
    Bare(Profile),
}

impl From<ProfileEnvelope> for Profile {
    fn from(envelope: ProfileEnvelope) -> Self {
        match envelope {
            ProfileEnvelope::Wrapped { user } | ProfileEnvelope::Bare(user) => user,
        }
    }
}

/// `GET /dsp/profile`.
///
/// # Errors
///
/// Returns the mapped backend failure.
pub async fn own_profile(client: &ApiClient) -> Result<Profile> {
    let envelope: ProfileEnvelope = client.get_json("/dsp/profile").await?;
    Ok(envelope.into())
}

/// `GET /users/getUserById/{id}`.
///
/// # Errors
///
/// Returns the mapped backend failure.
pub async fn user_by_id(client: &ApiClient, user_id: &str) -> Result<Profile> {
    let envelope: ProfileEnvelope = client
        .get_json(&format!("/users/getUserById/{user_id}"))
        .await?;
    Ok(envelope.into())
}
