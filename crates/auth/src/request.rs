//! Re-sendable request description used by `authenticated_fetch`.

use crate::error::{AuthError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// One field of a multipart form.
#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub value: MultipartValue,
}

#[derive(Debug, Clone)]
pub enum MultipartValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Vec<u8>),
    Bytes {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
    Multipart(Vec<MultipartField>),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// A request that can be built more than once, so the post-refresh retry
/// sends the same content as the first attempt.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
    timeout: Option<Duration>,
}

impl AuthRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: Url) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Adds a caller header. Caller headers win over the defaults.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub fn bytes(mut self, bytes: Vec<u8>, content_type: Option<&str>) -> Self {
        self.body = RequestBody::Bytes {
            bytes,
            content_type: content_type.map(str::to_string),
        };
        self
    }

    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    /// Per-request timeout, e.g. for regeneration-heavy calls.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Default headers, then the bearer token, then caller headers.
    pub(crate) fn merged_headers(&self, access_token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !self.body.is_multipart() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let RequestBody::Bytes {
            content_type: Some(content_type),
            ..
        } = &self.body
        {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
            headers.insert(CONTENT_TYPE, value);
        }

        let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        // reqwest writes the multipart Content-Type with its boundary
        let multipart = self.body.is_multipart();
        for (name, value) in self.headers.iter() {
            if multipart && *name == CONTENT_TYPE {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }

    pub(crate) fn build(
        &self,
        client: &Client,
        access_token: &str,
        default_timeout: Option<Duration>,
    ) -> Result<RequestBuilder> {
        let mut req = client
            .request(self.method.clone(), self.url.clone())
            .headers(self.merged_headers(access_token)?);

        if let Some(timeout) = self.timeout.or(default_timeout) {
            req = req.timeout(timeout);
        }

        req = match &self.body {
            RequestBody::Empty => req,
            RequestBody::Json(bytes) => req.body(bytes.clone()),
            RequestBody::Bytes { bytes, .. } => req.body(bytes.clone()),
            RequestBody::Multipart(fields) => req.multipart(build_form(fields)?),
        };
        Ok(req)
    }
}

fn build_form(fields: &[MultipartField]) -> Result<Form> {
    let mut form = Form::new();
    for field in fields {
        form = match &field.value {
            MultipartValue::Text(text) => form.text(field.name.clone(), text.clone()),
            MultipartValue::File {
                file_name,
                mime,
                bytes,
            } => {
                let mut part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    part = part.mime_str(mime)?;
                }
                form.part(field.name.clone(), part)
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://localhost:8000/chat/questions").unwrap()
    }

    #[test]
    fn test_json_request_gets_default_headers() {
        let req = AuthRequest::get(url());
        let headers = req.merged_headers("tok").unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
    }

    #[test]
    fn test_multipart_omits_content_type() {
        let req = AuthRequest::post(url()).multipart(vec![MultipartField {
            name: "file".to_string(),
            value: MultipartValue::File {
                file_name: "faq.pdf".to_string(),
                mime: Some("application/pdf".to_string()),
                bytes: b"%PDF".to_vec(),
            },
        }]);
        let headers = req.merged_headers("tok").unwrap();
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
    }

    #[test]
    fn test_multipart_ignores_caller_content_type() {
        let req = AuthRequest::post(url())
            .header("Content-Type", "application/json")
            .unwrap()
            .header("X-Request-Source", "dashboard")
            .unwrap()
            .multipart(vec![MultipartField {
                name: "category_id".to_string(),
                value: MultipartValue::Text("4".to_string()),
            }]);
        let headers = req.merged_headers("tok").unwrap();
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert_eq!(headers["x-request-source"], "dashboard");
    }

    #[test]
    fn test_caller_headers_win() {
        let req = AuthRequest::post(url())
            .header("Content-Type", "text/csv")
            .unwrap()
            .header("X-Request-Source", "dashboard")
            .unwrap();
        let headers = req.merged_headers("tok").unwrap();
        assert_eq!(headers[CONTENT_TYPE], "text/csv");
        assert_eq!(headers["x-request-source"], "dashboard");
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = AuthRequest::get(url()).header("bad header", "v").unwrap_err();
        assert!(matches!(err, AuthError::InvalidHeader(_)));
    }
}
