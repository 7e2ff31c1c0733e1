//! Expiry helpers over JWT access tokens.
//!
//! Nothing in this module verifies a signature. The backend is the authority
//! on whether a token is valid; the client only reads `exp` to decide when to
//! refresh, so the decoded payload must never be used for authorization.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::{Map, Value};
use std::time::Duration;

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Advisory view of a JWT payload. Unverified: read for scheduling only.
#[derive(Debug, Clone, PartialEq)]
pub struct UnverifiedClaims {
    /// Expiry as Unix seconds, when present and numeric.
    pub exp: Option<i64>,
    /// All claims as sent, `exp` included.
    pub claims: Map<String, Value>,
}

impl UnverifiedClaims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    fn expiry_ms(&self) -> Option<i64> {
        self.exp.map(|exp| exp.saturating_mul(1000))
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Decodes the payload segment of `token`.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON object in the middle.
pub fn decode_jwt(token: &str) -> Option<UnverifiedClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    // Accept padded and standard-alphabet payloads as well.
    let payload: String = segments[1]
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    let claims: Map<String, Value> = serde_json::from_slice(&bytes).ok()?;

    let exp = claims
        .get("exp")
        .and_then(|exp| exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64)));

    Some(UnverifiedClaims { exp, claims })
}

/// Whether `token` is expired at `now_ms`. Undecodable tokens and tokens
/// without `exp` count as expired.
pub fn is_token_expired_at(token: &str, now_ms: i64) -> bool {
    match decode_jwt(token).and_then(|claims| claims.expiry_ms()) {
        Some(expiry_ms) => now_ms >= expiry_ms,
        None => true,
    }
}

pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, now_ms())
}

/// Time left before `token` expires, floored at zero.
pub fn token_time_to_expiry_at(token: &str, now_ms: i64) -> Duration {
    decode_jwt(token)
        .and_then(|claims| claims.expiry_ms())
        .map(|expiry_ms| Duration::from_millis(expiry_ms.saturating_sub(now_ms).max(0) as u64))
        .unwrap_or(Duration::ZERO)
}

pub fn token_time_to_expiry(token: &str) -> Duration {
    token_time_to_expiry_at(token, now_ms())
}

/// Whether `token` is inside the refresh window but not yet expired.
///
/// The lower bound is strict: an already-expired token returns `false` and is
/// handled by the expiry check instead.
pub fn should_refresh_token_within(token: &str, now_ms: i64, window: Duration) -> bool {
    let ttl = token_time_to_expiry_at(token, now_ms);
    !ttl.is_zero() && ttl < window
}

pub fn should_refresh_token_at(token: &str, now_ms: i64) -> bool {
    should_refresh_token_within(token, now_ms, REFRESH_WINDOW)
}

pub fn should_refresh_token(token: &str) -> bool {
    should_refresh_token_at(token, now_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const NOW_MS: i64 = 1_700_000_000_000;

    fn token_with_exp(exp: i64) -> String {
        let claims = serde_json::json!({ "sub": "admin@uni.edu", "exp": exp });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test")).unwrap()
    }

    fn token_with_payload(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_decode_jwt_reads_exp_and_claims() {
        let token = token_with_exp(1_700_000_600);
        let claims = decode_jwt(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_600));
        assert_eq!(claims.get("sub").and_then(|v| v.as_str()), Some("admin@uni.edu"));
    }

    #[test]
    fn test_decode_jwt_rejects_malformed_input() {
        assert!(decode_jwt("").is_none());
        assert!(decode_jwt("header.payload").is_none());
        assert!(decode_jwt("a.b.c.d").is_none());
        assert!(decode_jwt("header.!!not-base64!!.sig").is_none());
        assert!(decode_jwt(&token_with_payload("not json")).is_none());
        assert!(decode_jwt("header..sig").is_none());
    }

    #[test]
    fn test_decode_jwt_tolerates_padding() {
        let padded = format!(
            "h.{}.s",
            base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":1}"#)
        );
        assert_eq!(decode_jwt(&padded).unwrap().exp, Some(1));
    }

    #[test]
    fn test_past_exp_is_expired() {
        let token = token_with_exp(NOW_MS / 1000 - 60);
        assert!(is_token_expired_at(&token, NOW_MS));
        assert_eq!(token_time_to_expiry_at(&token, NOW_MS), Duration::ZERO);
        assert!(!should_refresh_token_at(&token, NOW_MS));
    }

    #[test]
    fn test_far_future_exp_needs_nothing() {
        let token = token_with_exp(NOW_MS / 1000 + 3600);
        assert!(!is_token_expired_at(&token, NOW_MS));
        assert!(!should_refresh_token_at(&token, NOW_MS));
        assert_eq!(
            token_time_to_expiry_at(&token, NOW_MS),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_refresh_window_boundaries() {
        let four_minutes = token_with_exp(NOW_MS / 1000 + 4 * 60);
        assert!(should_refresh_token_at(&four_minutes, NOW_MS));
        assert!(!is_token_expired_at(&four_minutes, NOW_MS));

        let just_expired = token_with_exp(NOW_MS / 1000 - 1);
        assert!(!should_refresh_token_at(&just_expired, NOW_MS));
        assert!(is_token_expired_at(&just_expired, NOW_MS));

        let exactly_five = token_with_exp(NOW_MS / 1000 + 5 * 60);
        assert!(!should_refresh_token_at(&exactly_five, NOW_MS));

        // expiry instant itself counts as expired
        let at_now = token_with_exp(NOW_MS / 1000);
        assert!(is_token_expired_at(&at_now, NOW_MS));
        assert!(!should_refresh_token_at(&at_now, NOW_MS));
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let token = token_with_payload(r#"{"sub":"x"}"#);
        assert!(is_token_expired_at(&token, NOW_MS));
        assert!(!should_refresh_token_at(&token, NOW_MS));
        assert!(is_token_expired("garbage"));
    }
}
