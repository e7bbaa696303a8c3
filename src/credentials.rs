//! Client-local storage for the session token and driver id.
//!
//! The only state persisted on the device is these two strings. The
//! production store is the OS keychain; tests use [`MemoryStore`].

use std::sync::Mutex;

use tracing::{debug, warn};

use crate::config::KEYRING_SERVICE;
use crate::{AppError, Result};

const TOKEN_KEY: &str = "auth_token";
const USER_ID_KEY: &str = "user_id";

/// Bearer token and the driver id it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token returned by login.
    pub token: String,
    /// Driver user id.
    pub user_id: String,
}

/// Key-value persistence for [`Credentials`].
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials; `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credentials` if the backing store fails.
    fn load(&self) -> Result<Option<Credentials>>;

    /// Persist credentials, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credentials` if the backing store fails.
    fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Remove stored credentials. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credentials` if the backing store fails.
    fn clear(&self) -> Result<()>;
}

/// OS keychain store under the `dsp-courier` service.
#[derive(Debug, Default)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, key)
            .map_err(|err| AppError::Credentials(format!("keychain entry {key}: {err}")))
    }

    fn read(key: &str) -> Result<Option<String>> {
        match Self::entry(key)?.get_password() {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(AppError::Credentials(format!("read {key}: {err}"))),
        }
    }

    fn delete(key: &str) -> Result<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(AppError::Credentials(format!("delete {key}: {err}"))),
        }
    }
}

impl CredentialStore for KeyringStore {
    fn load(&self) -> Result<Option<Credentials>> {
        let token = Self::read(TOKEN_KEY)?;
        let user_id = Self::read(USER_ID_KEY)?;
        match (token, user_id) {
            (Some(token), Some(user_id)) => Ok(Some(Credentials { token, user_id })),
            (None, None) => Ok(None),
            _ => {
                warn!("keychain holds a partial session; ignoring it");
                Ok(None)
            }
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        Self::entry(TOKEN_KEY)?
            .set_password(&credentials.token)
            .map_err(|err| AppError::Credentials(format!("write {TOKEN_KEY}: {err}")))?;
        Self::entry(USER_ID_KEY)?
            .set_password(&credentials.user_id)
            .map_err(|err| AppError::Credentials(format!("write {USER_ID_KEY}: {err}")))?;
        debug!(user_id = %credentials.user_id, "credentials stored in keychain");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Self::delete(TOKEN_KEY)?;
        Self::delete(USER_ID_KEY)
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Credentials>>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Credentials("memory store poisoned".into()))
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.lock()? = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
