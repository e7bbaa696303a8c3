//! REST client for the DSP backend.
//!
//! [`ApiClient`] wraps a shared `reqwest::Client` with the backend base URL
//! and the driver's bearer token. Status codes are mapped onto [`AppError`]
//! in one place so every endpoint module reports failures the same way:
//! 401/403 become `Unauthorized`, 404 becomes `NotFound`, any other
//! non-success status or transport failure becomes `Http`. No call is
//! retried automatically.

pub mod auth;
pub mod location;
pub mod messages;
pub mod orders;
pub mod profile;

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::BackendConfig;
use crate::{AppError, Result};

/// Authenticated HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Build an unauthenticated client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the TLS backend cannot be initialised.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Http(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: None,
        })
    }

    /// Build a client from backend configuration.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.base_url, config.request_timeout())
    }

    /// Clone of this client carrying `token` as bearer credential.
    #[must_use]
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    /// Whether a bearer token is attached.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder, required: bool) -> Result<RequestBuilder> {
        match (&self.token, required) {
            (Some(token), _) => Ok(request.bearer_auth(token)),
            (None, false) => Ok(request),
            (None, true) => Err(AppError::Unauthorized("no session token".into())),
        }
    }

    /// `GET path` with bearer auth, decoding a JSON body.
    ///
    /// # Errors
    ///
    /// Maps status and transport failures as described in the module docs.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json_query(path, &[]).await
    }

    /// `GET path?query` with bearer auth, decoding a JSON body.
    ///
    /// # Errors
    ///
    /// Maps status and transport failures as described in the module docs.
    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!(path, "GET");
        let request = self.authorize(self.http.get(self.url(path)).query(query), true)?;
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// `POST path` with a JSON body and bearer auth, decoding a JSON reply.
    ///
    /// # Errors
    ///
    /// Maps status and transport failures as described in the module docs.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(path, body, true).await?;
        Ok(response.json().await?)
    }

    /// `POST path` with a JSON body and bearer auth, ignoring the reply body.
    ///
    /// # Errors
    ///
    /// Maps status and transport failures as described in the module docs.
    pub async fn post_unit<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.post(path, body, true).await.map(drop)
    }

    /// `POST path` without requiring a token (login).
    ///
    /// # Errors
    ///
    /// Maps status and transport failures as described in the module docs.
    pub async fn post_json_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(path, body, false).await?;
        Ok(response.json().await?)
    }

    async fn post<B>(&self, path: &str, body: &B, auth_required: bool) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        debug!(path, "POST");
        let request = self.authorize(self.http.post(self.url(path)).json(body), auth_required)?;
        check_status(request.send().await?).await
    }
}

/// Map non-success statuses onto [`AppError`].
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
        StatusCode::NOT_FOUND => AppError::NotFound(detail),
        _ => AppError::Http(detail),
    })
}
