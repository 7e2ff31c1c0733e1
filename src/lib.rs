//! Chatbot Admin Rust Client Library
//!
//! A Rust client for the university chatbot administration backend. It keeps
//! the admin session alive (login, proactive refresh, one retry on 401) and
//! exposes authenticated helpers for the content endpoints.

pub mod config;
pub mod error;
pub mod fetch;

use std::sync::Arc;

use chatbot_admin_auth::{
    AuthConfig, AuthService, FileStore, GuardConfig, KeyValueStore, MemoryCookieJar, MemoryStore,
    Navigator, RouteGuard,
};
use log::debug;
use reqwest::Client;

use crate::config::ClientOptions;
use crate::error::Result;
use crate::fetch::ApiClient;

pub use chatbot_admin_auth as auth;

/// The main entry point for the admin client
pub struct AdminClient {
    /// Client options
    pub options: ClientOptions,
    auth: Arc<AuthService>,
    api: ApiClient,
    cookies: Arc<MemoryCookieJar>,
}

impl AdminClient {
    /// Create a new client logging session-end redirects
    ///
    /// # Example
    ///
    /// ```
    /// use chatbot_admin::{AdminClient, config::ClientOptions};
    ///
    /// let options = ClientOptions::new("http://localhost:8000".parse().unwrap());
    /// let client = AdminClient::new(options).unwrap();
    /// assert!(!client.auth().is_authenticated());
    /// ```
    pub fn new(options: ClientOptions) -> Result<Self> {
        Self::build(options, None)
    }

    /// Create a new client that reports session-end redirects to `navigator`
    pub fn with_navigator(options: ClientOptions, navigator: Arc<dyn Navigator>) -> Result<Self> {
        Self::build(options, Some(navigator))
    }

    fn build(options: ClientOptions, navigator: Option<Arc<dyn Navigator>>) -> Result<Self> {
        let http_client = Client::builder().build()?;

        let store: Arc<dyn KeyValueStore> = match &options.session_file {
            Some(path) => {
                debug!("Persisting session to {}", path.display());
                Arc::new(FileStore::new(path))
            }
            None => Arc::new(MemoryStore::new()),
        };
        let cookies = Arc::new(MemoryCookieJar::new());

        let config = AuthConfig::new(options.api_url.clone())
            .with_login_path(&options.login_path)
            .with_refresh_window(options.refresh_window)
            .with_request_timeout(options.request_timeout);

        let mut auth = AuthService::new(config, http_client, store, cookies.clone());
        if let Some(navigator) = navigator {
            auth = auth.with_navigator(navigator);
        }
        let auth = Arc::new(auth);
        let api = ApiClient::new(auth.clone(), options.extended_timeout);

        Ok(Self {
            options,
            auth,
            api,
            cookies,
        })
    }

    /// Build a client from `CHATBOT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientOptions::from_env()?)
    }

    /// Session lifecycle: login, logout, refresh, password reset
    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    /// Authenticated resource calls
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Cookie mirror of the access token, as seen by the route guard
    pub fn cookies(&self) -> &Arc<MemoryCookieJar> {
        &self.cookies
    }

    /// Route guard configured with this client's login route
    pub fn route_guard(&self) -> RouteGuard {
        let mut config = GuardConfig {
            login_path: self.options.login_path.clone(),
            ..GuardConfig::default()
        };
        if !config.public_paths.contains(&config.login_path) {
            config.public_paths.push(config.login_path.clone());
        }
        RouteGuard::new(config)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::ClientOptions;
    pub use crate::error::{Error, Result};
    pub use crate::fetch::ApiClient;
    pub use crate::AdminClient;
    pub use chatbot_admin_auth::{AuthRequest, Credentials, GuardDecision, TokenPair};
}
