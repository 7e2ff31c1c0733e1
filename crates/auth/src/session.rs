//! Session persistence: the only code allowed to write tokens.

use crate::error::StorageError;
use crate::jwt::now_ms;
use crate::storage::{
    CookieJar, KeyValueStore, MirrorCookie, SameSite, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
    TOKEN_COOKIE_NAME, TOKEN_EXPIRY_KEY,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Token pair issued by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// What is currently persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry in epoch milliseconds.
    pub token_expiry: Option<i64>,
}

pub struct SessionPersistence {
    store: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn CookieJar>,
}

impl SessionPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, cookies: Arc<dyn CookieJar>) -> Self {
        Self { store, cookies }
    }

    /// Writes the three durable entries and the cookie mirror.
    ///
    /// Either everything is written or, on failure, everything is cleared
    /// again before the error is returned. A non-positive `expires_in` is
    /// rejected before anything is written, since the cookie mirror could
    /// not hold it.
    pub fn set_tokens(&self, pair: &TokenPair) -> Result<(), StorageError> {
        if pair.expires_in <= 0 {
            warn!("Refusing to persist token with lifetime {}s", pair.expires_in);
            return Err(StorageError::InvalidLifetime(pair.expires_in));
        }

        let expiry = now_ms().saturating_add(pair.expires_in.saturating_mul(1000));
        let cookie = MirrorCookie {
            name: TOKEN_COOKIE_NAME.to_string(),
            value: pair.access_token.clone(),
            path: "/".to_string(),
            max_age: pair.expires_in,
            same_site: SameSite::Strict,
        };

        let written = self
            .store
            .set(ACCESS_TOKEN_KEY, &pair.access_token)
            .and_then(|_| self.store.set(REFRESH_TOKEN_KEY, &pair.refresh_token))
            .and_then(|_| self.store.set(TOKEN_EXPIRY_KEY, &expiry.to_string()))
            .and_then(|_| self.cookies.set_cookie(&cookie));

        if let Err(err) = written {
            warn!("Persisting session failed, rolling back: {}", err);
            if let Err(rollback) = self.clear_tokens() {
                warn!("Rollback after failed persist also failed: {}", rollback);
            }
            return Err(err);
        }

        debug!("Session persisted, expires in {}s", pair.expires_in);
        Ok(())
    }

    /// Removes the durable entries and expires the cookie. Every step is
    /// attempted; the first failure is reported.
    pub fn clear_tokens(&self) -> Result<(), StorageError> {
        let expired = MirrorCookie {
            name: TOKEN_COOKIE_NAME.to_string(),
            value: String::new(),
            path: "/".to_string(),
            max_age: -1,
            same_site: SameSite::Strict,
        };

        let results = [
            self.store.remove(ACCESS_TOKEN_KEY),
            self.store.remove(REFRESH_TOKEN_KEY),
            self.store.remove(TOKEN_EXPIRY_KEY),
            self.cookies.set_cookie(&expired),
        ];

        debug!("Session cleared");
        results.into_iter().collect::<Result<Vec<()>, _>>().map(|_| ())
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    pub fn token_expiry(&self) -> Result<Option<i64>, StorageError> {
        Ok(self
            .store
            .get(TOKEN_EXPIRY_KEY)?
            .and_then(|raw| raw.parse::<i64>().ok()))
    }

    pub fn snapshot(&self) -> Result<Option<StoredSession>, StorageError> {
        let Some(access_token) = self.access_token()? else {
            return Ok(None);
        };
        Ok(Some(StoredSession {
            access_token,
            refresh_token: self.refresh_token()?,
            token_expiry: self.token_expiry()?,
        }))
    }
}
