//! Configuration options for the admin client

use crate::error::Error;
use chatbot_admin_auth::REFRESH_WINDOW;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Configuration options for the admin client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the chatbot REST backend
    pub api_url: Url,

    /// Default timeout for every request
    pub request_timeout: Option<Duration>,

    /// Timeout for slow operations such as answer regeneration or uploads
    pub extended_timeout: Duration,

    /// Tokens closer than this to expiry are refreshed before use
    pub refresh_window: Duration,

    /// Where the session is persisted; in-memory when unset
    pub session_file: Option<PathBuf>,

    /// Route the user is sent to after logout
    pub login_path: String,
}

impl ClientOptions {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            request_timeout: Some(Duration::from_secs(30)),
            extended_timeout: Duration::from_secs(300),
            refresh_window: REFRESH_WINDOW,
            session_file: None,
            login_path: "/login".to_string(),
        }
    }

    /// Reads `CHATBOT_API_URL` (required), `CHATBOT_SESSION_FILE` and
    /// `CHATBOT_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        let api_url = std::env::var("CHATBOT_API_URL")
            .map_err(|_| Error::config("CHATBOT_API_URL environment variable not found"))?;
        let mut options = Self::new(Url::parse(&api_url)?);

        if let Ok(path) = std::env::var("CHATBOT_SESSION_FILE") {
            options = options.with_session_file(Some(PathBuf::from(path)));
        }

        if let Ok(raw) = std::env::var("CHATBOT_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                Error::config(format!("CHATBOT_REQUEST_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            options = options.with_request_timeout(Some(Duration::from_secs(secs)));
        }

        Ok(options)
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the timeout used for slow operations
    pub fn with_extended_timeout(mut self, value: Duration) -> Self {
        self.extended_timeout = value;
        self
    }

    /// Set the proactive refresh window
    pub fn with_refresh_window(mut self, value: Duration) -> Self {
        self.refresh_window = value;
        self
    }

    /// Persist the session to a file
    pub fn with_session_file(mut self, value: Option<PathBuf>) -> Self {
        self.session_file = value;
        self
    }

    /// Set the login route
    pub fn with_login_path(mut self, value: &str) -> Self {
        self.login_path = value.to_string();
        self
    }
}
