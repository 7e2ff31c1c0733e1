//! Authenticated helpers for the resource endpoints (`/chat/*`, `/profile/*`)

use crate::error::{Error, Result};
use chatbot_admin_auth::{AuthRequest, AuthService, MultipartField};
use reqwest::Response;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Helper for calling resource endpoints through `AuthService::authenticated_fetch`
#[derive(Clone)]
pub struct ApiClient {
    auth: Arc<AuthService>,
    extended_timeout: Duration,
}

impl ApiClient {
    /// Create a new ApiClient
    pub fn new(auth: Arc<AuthService>, extended_timeout: Duration) -> Self {
        Self {
            auth,
            extended_timeout,
        }
    }

    /// Resolve a backend path against the configured base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.auth.config().endpoint(path)?)
    }

    fn url_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send a request and return the raw response; the status is not interpreted
    pub async fn raw(&self, request: AuthRequest) -> Result<Response> {
        Ok(self.auth.authenticated_fetch(request).await?)
    }

    /// Send a request and parse a JSON answer. Non-2xx becomes `Error::Api`
    pub async fn execute<T: DeserializeOwned>(&self, request: AuthRequest) -> Result<T> {
        let response = self.raw(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::api(status.as_u16(), &text));
        }

        // 204 and empty bodies parse as JSON null
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(AuthRequest::get(self.url(path)?)).await
    }

    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.execute(AuthRequest::get(self.url_with_query(path, query)?))
            .await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute(AuthRequest::post(self.url(path)?).json(body)?)
            .await
    }

    /// Like `post_json`, with the extended timeout for slow backend work
    pub async fn post_json_slow<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = AuthRequest::post(self.url(path)?)
            .json(body)?
            .timeout(self.extended_timeout);
        self.execute(request).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute(AuthRequest::put(self.url(path)?).json(body)?)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.raw(AuthRequest::delete(self.url(path)?)).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), &text));
        }
        Ok(())
    }

    /// Multipart upload (documents, images) with the extended timeout
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: Vec<MultipartField>,
    ) -> Result<T> {
        let request = AuthRequest::post(self.url(path)?)
            .multipart(fields)
            .timeout(self.extended_timeout);
        self.execute(request).await
    }
}
