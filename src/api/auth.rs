//! Login and logout.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::credentials::{CredentialStore, Credentials};
use crate::{AppError, Result};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginUser {
    #[serde(alias = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: String,
    user: Option<LoginUser>,
}

/// `POST /users/login`, persisting the returned token and user id.
///
/// # Errors
///
/// `AppError::Unauthorized` on rejected credentials, `AppError::Malformed`
/// when the reply lacks a token or user id, `AppError::Http` on transport
/// failure, `AppError::Credentials` if the token cannot be stored.
pub async fn login(
    client: &ApiClient,
    store: &dyn CredentialStore,
    email: &str,
    password: &str,
) -> Result<Credentials> {
    let response: LoginResponse = client
        .post_json_anonymous("/users/login", &LoginRequest { email, password })
        .await?;

    let user_id = response
        .user
        .map(|u| u.id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Malformed("login response has no user id".into()))?;
    if response.token.is_empty() {
        return Err(AppError::Malformed("login response has no token".into()));
    }

    let credentials = Credentials {
        token: response.token,
        user_id,
    };
    store.save(&credentials)?;
    info!(user_id = %credentials.user_id, "driver logged in");
    Ok(credentials)
}

/// `POST /users/logout`, then clear local credentials.
///
/// Local credentials are cleared even when the backend call fails; the
/// backend error is still returned so the caller can report it.
///
/// # Errors
///
/// The backend error, or `AppError::Credentials` if clearing fails.
pub async fn logout(client: &ApiClient, store: &dyn CredentialStore) -> Result<()> {
    let remote = client.post_unit("/users/logout", &serde_json::json!({})).await;
    if let Err(err) = &remote {
        warn!(%err, "backend logout failed; clearing local session anyway");
    }
    store.clear()?;
    info!("driver logged out");
    remote
}
