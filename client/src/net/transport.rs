//! HTTP transport for the annotation API.
//!
//! DESIGN
//! ======
//! [`Transport`] is the only place bytes leave the process. `HttpTransport`
//! is a thin reqwest wrapper bound to the configured base address; tests swap
//! in scripted transports to control response ordering.

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::time::Duration;

use reqwest::Method;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::NetworkError;

/// One request against the API, relative to the base address.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn with_query(mut self, query: Vec<(&'static str, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw status and body of a completed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the backend. Implementations must not retry on their own.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`NetworkError`] if no response could be obtained. A
    /// non-success status is still a response and is returned as `Ok`.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`NetworkError::ClientBuild`] if the reqwest client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| NetworkError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_url.clone() })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn classify(err: &reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout(err.to_string())
    } else {
        NetworkError::Request(err.to_string())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, %url, "api request");

        let mut builder = self.http.request(request.method, &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(&e))?;
        debug!(%url, status, "api response");
        Ok(ApiResponse { status, body })
    }
}
