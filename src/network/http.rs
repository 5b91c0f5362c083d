//! HTTP transport over reqwest

use super::{GraphQLResponse, Transport};
use crate::config::TransportConfig;
use crate::{CacheError, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Per-request timeout when none is configured
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts `{query, variables}` to a GraphQL endpoint
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for an endpoint
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static(concat!("graphcache/", env!("CARGO_PKG_VERSION"))),
                );
                headers.insert(
                    header::ACCEPT,
                    header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let mut transport = Self::new(&config.endpoint)?.with_timeout(config.timeout());
        transport.auth_token = config.resolved_token();
        Ok(transport)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, query: &str, variables: &Value) -> Result<GraphQLResponse> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(endpoint = %self.endpoint, "Posting GraphQL operation");
        let response = request.timeout(self.timeout).send().await?;

        match response.status() {
            StatusCode::OK => {
                let result: GraphQLResponse = response.json().await?;
                if let Some(message) = result.error_message() {
                    return Err(CacheError::GraphQL(message));
                }
                Ok(result)
            }
            StatusCode::UNAUTHORIZED => Err(CacheError::Network(
                "GraphQL endpoint authentication failed".to_string(),
            )),
            StatusCode::FORBIDDEN => Err(CacheError::Network(
                "GraphQL endpoint forbidden".to_string(),
            )),
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(CacheError::Network(format!(
                    "GraphQL endpoint error: HTTP {}: {}",
                    status, error_body
                )))
            }
        }
    }
}
