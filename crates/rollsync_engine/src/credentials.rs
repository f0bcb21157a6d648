//! Bearer credentials for the Export API.

use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use parking_lot::RwLock;
use rollsync_model::Scalar;
use serde::Deserialize;
use tracing::{debug, info};

/// Path of the password-grant token endpoint, relative to the base URL.
pub const TOKEN_PATH: &str = "/oauth/token";

/// Supplies the bearer token sent with every fetch.
pub trait TokenProvider: Send + Sync {
    /// Returns a token, acquiring one if none is cached.
    fn token(&self) -> SyncResult<String>;

    /// Drops the cached token so the next call to [`token`](Self::token)
    /// acquires a fresh one.
    fn invalidate(&self);
}

impl<T: TokenProvider + ?Sized> TokenProvider for std::sync::Arc<T> {
    fn token(&self) -> SyncResult<String> {
        (**self).token()
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

/// A fixed, externally issued token.
///
/// Invalidation is a no-op: a rejected static token stays rejected.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").finish_non_exhaustive()
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> SyncResult<String> {
        Ok(self.token.clone())
    }

    fn invalidate(&self) {}
}

/// A token acquired through the password grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token.
    pub access_token: String,
    /// Identity provider that issued it, if reported.
    pub provider_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(rename = "providerId", default)]
    provider_id: Option<Scalar>,
}

/// Acquires tokens from `POST {base_url}/oauth/token` with the resource
/// owner password grant and caches them until invalidated.
pub struct PasswordGrant<C: HttpClient> {
    token_url: String,
    username: String,
    password: String,
    client: C,
    cached: RwLock<Option<AccessToken>>,
}

impl<C: HttpClient> PasswordGrant<C> {
    /// Creates a provider for the API at `base_url`.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        client: C,
    ) -> Self {
        Self {
            token_url: format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
            client,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached token, if any.
    pub fn cached(&self) -> Option<AccessToken> {
        self.cached.read().clone()
    }

    fn acquire(&self) -> SyncResult<AccessToken> {
        debug!(url = %self.token_url, username = %self.username, "requesting access token");
        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("grant_type", "password"),
        ];
        let response = self
            .client
            .post_form(&self.token_url, &form)
            .map_err(|e| SyncError::TransientFetch(format!("{TOKEN_PATH}: {e}")))?;

        if response.is_success() {
            let parsed: TokenResponse = serde_json::from_slice(&response.body)
                .map_err(|e| SyncError::Protocol(format!("invalid token response: {e}")))?;
            return Ok(AccessToken {
                access_token: parsed.access_token,
                provider_id: parsed.provider_id.map(|id| id.to_string()),
            });
        }
        match response.status {
            400 | 401 | 403 => Err(SyncError::Auth(format!(
                "{TOKEN_PATH} returned {}: {}",
                response.status,
                response.body_excerpt()
            ))),
            402..=499 => Err(SyncError::Request {
                status: response.status,
                message: response.body_excerpt(),
            }),
            status => Err(SyncError::TransientFetch(format!(
                "{TOKEN_PATH} returned {status}"
            ))),
        }
    }
}

impl<C: HttpClient> TokenProvider for PasswordGrant<C> {
    fn token(&self) -> SyncResult<String> {
        if let Some(cached) = self.cached.read().as_ref() {
            return Ok(cached.access_token.clone());
        }

        let mut cached = self.cached.write();
        // Another thread may have acquired one while we waited.
        if let Some(existing) = cached.as_ref() {
            return Ok(existing.access_token.clone());
        }
        let token = self.acquire()?;
        info!(provider = ?token.provider_id, "acquired access token");
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    fn invalidate(&self) {
        if self.cached.write().take().is_some() {
            debug!("access token invalidated");
        }
    }
}
