//! Session lifecycle and the authenticated fetch protocol.

use crate::error::{AuthError, Result};
use crate::jwt::{is_token_expired_at, now_ms, should_refresh_token_within, REFRESH_WINDOW};
use crate::request::AuthRequest;
use crate::session::{SessionPersistence, StoredSession, TokenPair};
use crate::storage::{CookieJar, KeyValueStore};
use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Endpoints and timing of the auth backend.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: Url,
    pub token_path: String,
    pub refresh_path: String,
    pub password_reset_request_path: String,
    pub password_reset_path: String,
    /// Route the user is sent to when the session ends.
    pub login_path: String,
    pub refresh_window: Duration,
    pub request_timeout: Option<Duration>,
}

impl AuthConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            token_path: "/auth/token".to_string(),
            refresh_path: "/auth/refresh/".to_string(),
            password_reset_request_path: "/auth/password-reset-request".to_string(),
            password_reset_path: "/auth/password-reset".to_string(),
            login_path: "/login".to_string(),
            refresh_window: REFRESH_WINDOW,
            request_timeout: None,
        }
    }

    pub fn with_login_path(mut self, path: &str) -> Self {
        self.login_path = path.to_string();
        self
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Joins `path` onto the base URL, keeping any path prefix of the base.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }
}

/// Performs the hard navigation that follows a logout.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Default navigator for headless use: records the redirect in the log.
#[derive(Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        info!("Session ended, redirecting to {}", path);
    }
}

/// Login form fields.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

// Refresh responses may omit the refresh token when it is not rotated.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    token_type: Option<String>,
}

#[derive(Debug)]
enum Preflight {
    Fresh(String),
    RefreshDue(String),
    Expired(Option<String>),
}

/// Session context. Build one per application and share it as
/// `Arc<AuthService>`; it is the single writer of the token store.
pub struct AuthService {
    config: AuthConfig,
    http_client: Client,
    session: SessionPersistence,
    navigator: Arc<dyn Navigator>,
    // Held for the whole refresh exchange; at most one is in flight.
    refresh_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        http_client: Client,
        store: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn CookieJar>,
    ) -> Self {
        Self {
            config,
            http_client,
            session: SessionPersistence::new(store, cookies),
            navigator: Arc::new(LogNavigator),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionPersistence {
        &self.session
    }

    /// Logs in with username and password and persists the session.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair> {
        let url = self.config.endpoint(&self.config.token_path)?;

        let response = self.http_client.post(url).form(credentials).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Login rejected with status {}", status);
            return Err(AuthError::from_backend(status, &body, "Login failed"));
        }

        let pair: TokenPair = response.json().await?;
        self.session.set_tokens(&pair)?;
        info!("Logged in as {}", credentials.username);

        Ok(pair)
    }

    /// Exchanges the stored refresh token for a new pair.
    ///
    /// Returns `Ok(None)` when there is no refresh token or the backend
    /// rejects it; a rejection clears the whole session. Concurrent callers
    /// share a single in-flight refresh.
    pub async fn refresh_token(&self) -> Result<Option<TokenPair>> {
        let seen = self.session.access_token()?;
        self.refresh_replacing(seen.as_deref()).await
    }

    /// Refreshes unless the stored token already moved past `seen`.
    ///
    /// `seen` is the access token the caller found unusable. Once the lock is
    /// held, a different unexpired token in the store (written by a refresh
    /// or a login that finished meanwhile) is handed back without another
    /// round trip.
    async fn refresh_replacing(&self, seen: Option<&str>) -> Result<Option<TokenPair>> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.session.snapshot()? {
            let now = now_ms();
            if Some(current.access_token.as_str()) != seen
                && !is_token_expired_at(&current.access_token, now)
            {
                debug!("Session was renewed while waiting, reusing stored token");
                return Ok(Some(stored_pair(current, now)));
            }
        }

        self.perform_refresh().await
    }

    async fn perform_refresh(&self) -> Result<Option<TokenPair>> {
        let Some(refresh_token) = self.session.refresh_token()? else {
            info!("No refresh token stored, cannot refresh session");
            return Ok(None);
        };

        let url = self.config.endpoint(&self.config.refresh_path)?;
        let payload = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(
                "Token refresh rejected with status {}, clearing session",
                response.status()
            );
            self.session.clear_tokens()?;
            return Ok(None);
        }

        let refreshed: RefreshResponse = response.json().await?;
        let pair = TokenPair {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token.unwrap_or(refresh_token),
            expires_in: refreshed.expires_in,
            token_type: refreshed.token_type,
        };
        self.session.set_tokens(&pair)?;
        debug!("Session refreshed");

        Ok(Some(pair))
    }

    /// Clears the session and navigates to the login route. Idempotent.
    pub fn logout(&self) -> Result<()> {
        let cleared = self.session.clear_tokens();
        self.navigator.navigate(&self.config.login_path);
        cleared.map_err(AuthError::from)
    }

    /// Asks the backend to email a password reset link.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let payload = serde_json::json!({ "email": email });
        self.post_public(
            &self.config.password_reset_request_path,
            &payload,
            "Password reset request failed",
        )
        .await
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let payload = serde_json::json!({
            "token": token,
            "new_password": new_password,
        });
        self.post_public(&self.config.password_reset_path, &payload, "Password reset failed")
            .await
    }

    async fn post_public(
        &self,
        path: &str,
        payload: &serde_json::Value,
        fallback: &str,
    ) -> Result<()> {
        let url = self.config.endpoint(path)?;

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_backend(status, &body, fallback));
        }

        Ok(())
    }

    /// Current access token, if any. Not checked for expiry.
    pub fn access_token(&self) -> Option<String> {
        match self.session.access_token() {
            Ok(token) => token,
            Err(err) => {
                warn!("Reading access token failed: {}", err);
                None
            }
        }
    }

    /// Token present and not expired.
    pub fn is_authenticated(&self) -> bool {
        self.access_token()
            .map(|token| !is_token_expired_at(&token, now_ms()))
            .unwrap_or(false)
    }

    fn preflight(&self) -> Result<Preflight> {
        let now = now_ms();
        Ok(match self.session.access_token()? {
            Some(token) if should_refresh_token_within(&token, now, self.config.refresh_window) => {
                Preflight::RefreshDue(token)
            }
            Some(token) if is_token_expired_at(&token, now) => Preflight::Expired(Some(token)),
            Some(token) => Preflight::Fresh(token),
            None => Preflight::Expired(None),
        })
    }

    async fn refresh_or_logout(&self, seen: Option<&str>) -> Result<TokenPair> {
        match self.refresh_replacing(seen).await? {
            Some(pair) => Ok(pair),
            None => {
                if let Err(err) = self.logout() {
                    warn!("Logout after failed refresh did not complete: {}", err);
                }
                Err(AuthError::SessionExpired)
            }
        }
    }

    async fn send(&self, request: &AuthRequest, access_token: &str) -> Result<Response> {
        let response = request
            .build(&self.http_client, access_token, self.config.request_timeout)?
            .send()
            .await?;
        Ok(response)
    }

    /// Sends `request` with the bearer token, refreshing first when the token
    /// is near or past expiry, and refreshing and retrying exactly once on a
    /// 401. Any other response, including a second 401, is returned as is.
    ///
    /// `AuthError::SessionExpired` is returned only after logout happened.
    pub async fn authenticated_fetch(&self, request: AuthRequest) -> Result<Response> {
        let access_token = match self.preflight()? {
            Preflight::Fresh(token) => token,
            Preflight::RefreshDue(token) => {
                debug!("Access token close to expiry, refreshing before request");
                self.refresh_or_logout(Some(&token)).await?.access_token
            }
            Preflight::Expired(seen) => {
                debug!("Access token missing or expired, refreshing before request");
                self.refresh_or_logout(seen.as_deref()).await?.access_token
            }
        };

        let response = self.send(&request, &access_token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!(
            "{} {} returned 401, refreshing and retrying once",
            request.method(),
            request.url().path()
        );
        let pair = self.refresh_or_logout(Some(&access_token)).await?;
        self.send(&request, &pair.access_token).await
    }
}

fn stored_pair(stored: StoredSession, now_ms: i64) -> TokenPair {
    let expires_in = stored
        .token_expiry
        .map(|expiry| (expiry - now_ms) / 1000)
        .unwrap_or_default();
    TokenPair {
        access_token: stored.access_token,
        refresh_token: stored.refresh_token.unwrap_or_default(),
        expires_in,
        token_type: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryCookieJar, MemoryStore};

    fn service(base: &str) -> AuthService {
        AuthService::new(
            AuthConfig::new(Url::parse(base).unwrap()),
            Client::new(),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCookieJar::new()),
        )
    }

    #[test]
    fn test_endpoint_keeps_base_prefix() {
        let config = AuthConfig::new(Url::parse("https://bot.uni.edu/api/").unwrap());
        assert_eq!(
            config.endpoint("/auth/refresh/").unwrap().as_str(),
            "https://bot.uni.edu/api/auth/refresh/"
        );
        assert_eq!(
            config.endpoint("auth/token").unwrap().as_str(),
            "https://bot.uni.edu/api/auth/token"
        );
    }

    #[test]
    fn test_refresh_without_token_returns_none() {
        tokio_test::block_on(async {
            let auth = service("http://127.0.0.1:9");
            let result = auth.refresh_token().await.unwrap();
            assert!(result.is_none());
        });
    }

    #[test]
    fn test_fetch_without_session_expires() {
        tokio_test::block_on(async {
            let auth = service("http://127.0.0.1:9");
            let url = auth.config().endpoint("/chat/questions").unwrap();
            let err = auth
                .authenticated_fetch(AuthRequest::get(url))
                .await
                .unwrap_err();
            assert!(err.is_session_expired());
            assert!(!auth.is_authenticated());
        });
    }
}
