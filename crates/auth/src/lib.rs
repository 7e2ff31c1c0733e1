//! Authentication core for the chatbot admin client.
//!
//! This crate owns the client side of the session: reading expiry from
//! access tokens, persisting the token pair together with its cookie mirror,
//! refreshing it (at most one refresh in flight), wrapping authenticated
//! requests with a single refresh-and-retry on 401, and the cookie-based
//! route guard that runs before a page is rendered.

pub mod error;
pub mod guard;
pub mod jwt;
pub mod request;
pub mod service;
pub mod session;
pub mod storage;

pub use error::{AuthError, Result, StorageError};
pub use guard::{GuardConfig, GuardDecision, RouteGuard};
pub use jwt::{
    decode_jwt, is_token_expired, should_refresh_token, token_time_to_expiry, UnverifiedClaims,
    REFRESH_WINDOW,
};
pub use request::{AuthRequest, MultipartField, MultipartValue, RequestBody};
pub use service::{AuthConfig, AuthService, Credentials, LogNavigator, Navigator};
pub use session::{SessionPersistence, StoredSession, TokenPair};
pub use storage::{
    CookieJar, FileStore, KeyValueStore, MemoryCookieJar, MemoryStore, MirrorCookie, SameSite,
};
