//! Shared HTTP client for the agent service.
//!
//! Holds the base URL, timeout and optional bearer token, and maps transport
//! and status failures into one internal shape that each port adapter turns
//! into its own error type.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;

/// Configuration for the agent service client.
#[derive(Debug, Clone)]
pub struct AgentApiConfig {
    /// Base URL of the service (e.g., "http://localhost:3000").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Bearer token sent with every request, if set.
    api_token: Option<Secret<String>>,
}

impl AgentApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            api_token: None,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the bearer token.
    pub fn with_api_token(mut self, token: Secret<String>) -> Self {
        self.api_token = Some(token);
        self
    }

    fn api_token(&self) -> Option<&str> {
        self.api_token.as_ref().map(|t| t.expose_secret().as_str())
    }
}

/// HTTP client for the agent service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AgentApiClient {
    config: AgentApiConfig,
    client: Client,
}

/// Transport-level failure, before it is mapped to a port error.
#[derive(Debug)]
pub(crate) enum ApiFailure {
    Timeout { timeout_secs: u64 },
    Network(String),
    Status { status: StatusCode, body: String },
    Malformed(String),
}

impl AgentApiClient {
    pub fn new(config: AgentApiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &AgentApiConfig {
        &self.config
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    pub(crate) fn segment_url(&self, segments: &[&str]) -> Result<Url, ApiFailure> {
        let invalid = || ApiFailure::Network(format!("Invalid base URL '{}'", self.config.base_url));
        let mut url = Url::parse(&self.config.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET on `segment_url(segments)`.
    pub(crate) fn get_segments(&self, segments: &[&str]) -> Result<RequestBuilder, ApiFailure> {
        Ok(self.authorize(self.client.get(self.segment_url(segments)?)))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and decodes a JSON success body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiFailure> {
        let response = request.send().await.map_err(|e| self.transport_failure(e))?;
        let response = Self::check_status(response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_failure(e))?;
        serde_json::from_str(&body)
            .map_err(|e| ApiFailure::Malformed(format!("Failed to parse response: {}", e)))
    }

    fn transport_failure(&self, e: reqwest::Error) -> ApiFailure {
        if e.is_timeout() {
            ApiFailure::Timeout {
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if e.is_connect() {
            ApiFailure::Network(format!("Connection failed: {}", e))
        } else {
            ApiFailure::Network(e.to_string())
        }
    }

    async fn check_status(response: Response) -> Result<Response, ApiFailure> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiFailure::Status { status, body })
    }
}
