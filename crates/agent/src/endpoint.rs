use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use cartkeeper_core::{Catalog, CartId};

/// Failure talking to one of the external commerce services.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode endpoint response: {0}")]
    Decode(String),
    #[error("endpoint is not configured: {0}")]
    NotConfigured(String),
}

impl EndpointError {
    /// Timeouts, transport faults, throttling and 5xx may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::NotConfigured(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Serialized order plus the key the receiver can deduplicate on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRequest {
    pub body: Vec<u8>,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAcknowledgment {
    pub status_code: u16,
    pub body: Value,
}

#[async_trait]
pub trait CartAllocator: Send + Sync {
    async fn allocate(&self) -> Result<CartId, EndpointError>;
}

#[async_trait]
pub trait OrderEndpoint: Send + Sync {
    async fn submit(&self, request: &OrderRequest) -> Result<OrderAcknowledgment, EndpointError>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Catalog, EndpointError>;
}

#[cfg(test)]
mod tests {
    use super::EndpointError;

    #[test]
    fn retryability_follows_failure_class() {
        assert!(EndpointError::Timeout { after_ms: 10_000 }.is_retryable());
        assert!(EndpointError::Transport("connection reset".to_owned()).is_retryable());
        assert!(EndpointError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(EndpointError::Status { status: 429, body: String::new() }.is_retryable());

        assert!(!EndpointError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!EndpointError::Status { status: 409, body: String::new() }.is_retryable());
        assert!(!EndpointError::Decode("eof".to_owned()).is_retryable());
        assert!(!EndpointError::NotConfigured("order_url".to_owned()).is_retryable());
    }

    #[test]
    fn status_code_is_only_reported_for_http_failures() {
        assert_eq!(EndpointError::Status { status: 502, body: String::new() }.status_code(), Some(502));
        assert_eq!(EndpointError::Timeout { after_ms: 5 }.status_code(), None);
    }
}
