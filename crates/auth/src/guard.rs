//! Pre-render route guard.
//!
//! Decides allow/redirect from cookie presence alone. It cannot read the
//! durable store or refresh, and it never looks at expiry: a stale cookie
//! passes here and the page's first authenticated call sends the user to
//! login instead.

use crate::storage::TOKEN_COOKIE_NAME;
use http::header::{COOKIE, LOCATION};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use log::debug;

const IMAGE_EXTENSIONS: [&str; 6] = [".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp"];
const EXCLUDED_PREFIXES: [&str; 3] = ["/api/", "/_next/static/", "/_next/image/"];

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub cookie_name: String,
    pub login_path: String,
    pub dashboard_path: String,
    /// Reachable without a session; `/` is handled separately.
    pub public_paths: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cookie_name: TOKEN_COOKIE_NAME.to_string(),
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            public_paths: vec![
                "/login".to_string(),
                "/forgot-password".to_string(),
                "/reset-password".to_string(),
                "/auth/email-change-complete".to_string(),
                "/".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

impl GuardDecision {
    /// 307 with `Location` for redirects, `None` when the request proceeds.
    pub fn into_response(self) -> Option<Response<()>> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::Redirect(location) => {
                let mut response = Response::new(());
                *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
                if let Ok(value) = HeaderValue::from_str(&location) {
                    response.headers_mut().insert(LOCATION, value);
                }
                Some(response)
            }
        }
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for header in headers.get_all(COOKIE) {
        let Ok(cookie_header) = header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    config: GuardConfig,
}

impl RouteGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Whether the guard runs for `path` at all. API routes, build assets
    /// and images are never intercepted.
    pub fn matches(&self, path: &str) -> bool {
        if path == "/favicon.ico" {
            return false;
        }
        if EXCLUDED_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix) || path == prefix.trim_end_matches('/'))
        {
            return false;
        }
        let lower = path.to_ascii_lowercase();
        !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }

    fn is_public(&self, path: &str) -> bool {
        self.config.public_paths.iter().any(|public| {
            public == path || (public != "/" && path.starts_with(&format!("{}/", public)))
        })
    }

    fn login_target(&self, query: Option<&str>) -> String {
        let redirect = query.and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "redirect")
                .map(|(_, value)| value.into_owned())
        });

        match redirect {
            // Only same-origin paths; `//host` would leave the site. The
            // target must also survive as a `Location` header value.
            Some(target)
                if target != self.config.login_path
                    && target.starts_with('/')
                    && !target.starts_with("//")
                    && !target.chars().any(char::is_control)
                    && HeaderValue::from_str(&target).is_ok() =>
            {
                target
            }
            _ => self.config.dashboard_path.clone(),
        }
    }

    pub fn decide(&self, path: &str, query: Option<&str>, has_cookie: bool) -> GuardDecision {
        if !self.matches(path) {
            return GuardDecision::Allow;
        }

        if path == "/" {
            let target = if has_cookie {
                &self.config.dashboard_path
            } else {
                &self.config.login_path
            };
            return GuardDecision::Redirect(target.clone());
        }

        if has_cookie && path == self.config.login_path {
            return GuardDecision::Redirect(self.login_target(query));
        }

        if !has_cookie && !self.is_public(path) {
            return GuardDecision::Redirect(format!(
                "{}?redirect={}",
                self.config.login_path,
                urlencoding::encode(path)
            ));
        }

        GuardDecision::Allow
    }

    pub fn evaluate<B>(&self, request: &Request<B>) -> GuardDecision {
        let has_cookie = get_cookie(request.headers(), &self.config.cookie_name)
            .map(|value| !value.is_empty())
            .unwrap_or(false);
        let uri = request.uri();
        let decision = self.decide(uri.path(), uri.query(), has_cookie);
        if let GuardDecision::Redirect(location) = &decision {
            debug!("Guard redirecting {} to {}", uri.path(), location);
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; token=abc123; other=1"),
        );
        assert_eq!(get_cookie(&headers, "token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("  token = abc123  ; a=b"));
        assert_eq!(get_cookie(&headers, "token"), Some("abc123"));
    }

    #[test]
    fn test_matcher_skips_assets() {
        let guard = RouteGuard::default();
        assert!(!guard.matches("/api/health"));
        assert!(!guard.matches("/_next/static/chunks/main.js"));
        assert!(!guard.matches("/_next/image"));
        assert!(!guard.matches("/favicon.ico"));
        assert!(!guard.matches("/logo.PNG"));
        assert!(guard.matches("/dashboard/content"));
        assert!(guard.matches("/"));
    }

    #[test]
    fn test_public_subpaths() {
        let guard = RouteGuard::default();
        assert_eq!(
            guard.decide("/reset-password/abc", None, false),
            GuardDecision::Allow
        );
        assert_eq!(
            guard.decide("/loginx", None, false),
            GuardDecision::Redirect("/login?redirect=%2Floginx".to_string())
        );
    }

    #[test]
    fn test_redirect_response() {
        let response = GuardDecision::Redirect("/dashboard".to_string())
            .into_response()
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/dashboard");
        assert!(GuardDecision::Allow.into_response().is_none());
    }
}
