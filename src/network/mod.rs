//! Network side of the cache
//!
//! A [`Transport`] posts one GraphQL operation. The [`RequestCoordinator`] sits in
//! front of it, keeps at most one fetch in flight per (query, variables) signature,
//! and feeds successful responses into the normalized cache.

mod coordinator;
mod http;

pub use coordinator::{RequestCoordinator, RequestSignature, RequestStatus};
pub use http::HttpTransport;

use crate::{CacheError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GraphQL response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

impl GraphQLResponse {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Error messages joined into one, if the server reported any
    pub fn error_message(&self) -> Option<String> {
        let errors = self.errors.as_ref().filter(|errors| !errors.is_empty())?;
        Some(
            errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// The data payload; reported errors or a missing payload fail
    pub fn into_data(self) -> Result<Value> {
        if let Some(message) = self.error_message() {
            return Err(CacheError::GraphQL(message));
        }
        match self.data {
            Some(Value::Null) | None => Err(CacheError::Network(
                "No data in GraphQL response".to_string(),
            )),
            Some(data) => Ok(data),
        }
    }
}

/// Sends one GraphQL operation
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, query: &str, variables: &Value) -> Result<GraphQLResponse>;
}
