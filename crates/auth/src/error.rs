use thiserror::Error;

/// Errors raised by the durable token store and its cookie mirror.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Token lifetime must be positive, got {0}s")]
    InvalidLifetime(i64),
}

/// Errors raised by the auth client.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The backend answered a login/refresh/reset call with a non-2xx status.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// The session could not be recovered. Logout has already happened.
    #[error("Session expired")]
    SessionExpired,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl AuthError {
    /// Builds an `ApiError` from a backend error body.
    pub fn from_backend(status: u16, body: &str, fallback: &str) -> Self {
        AuthError::ApiError {
            status,
            message: Self::backend_message(body, fallback),
        }
    }

    /// The body's `detail` field, then `message`, falling back to `fallback`
    /// when neither is a string.
    pub fn backend_message(body: &str, fallback: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["detail", "message"].iter().find_map(|field| {
                    value
                        .get(field)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                })
            })
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, AuthError::SessionExpired)
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
