//! Error handling for the admin client

use chatbot_admin_auth::AuthError;
use std::fmt;
use thiserror::Error;

/// Unified error type for the admin client
#[derive(Error, Debug)]
pub enum Error {
    /// Session and token errors, including an expired session
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Non-2xx answer from a resource endpoint
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Build an API error from a response body, using its `detail` or
    /// `message` field when present
    pub fn api(status: u16, body: &str) -> Self {
        let fallback = format!("Request failed with status {}", status);
        Error::Api {
            status,
            message: AuthError::backend_message(body, &fallback),
        }
    }

    /// Whether the session ended and the user has been sent to login
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Auth(err) if err.is_session_expired())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
