use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use cartkeeper_core::{ApplicationError, Cart, CartId, DomainError, OrderSnapshot, UserId};
use cartkeeper_db::CartRepository;

use crate::endpoint::{EndpointError, OrderEndpoint, OrderRequest};

/// Snapshot plus the exact bytes and key that go on the wire.
///
/// Retrying the same `PreparedOrder` resends an identical body under an
/// identical `Idempotency-Key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedOrder {
    pub snapshot: OrderSnapshot,
    pub request: OrderRequest,
}

impl PreparedOrder {
    pub fn from_cart(cart: &Cart) -> Result<Self, ApplicationError> {
        let snapshot = OrderSnapshot::from_cart(cart)?;
        let body = serde_json::to_vec(&snapshot).map_err(|error| {
            ApplicationError::Submission(format!("order snapshot could not be encoded: {error}"))
        })?;
        let idempotency_key = snapshot.idempotency_key().map_err(|error| {
            ApplicationError::Submission(format!("idempotency key could not be derived: {error}"))
        })?;
        Ok(Self { snapshot, request: OrderRequest { body, idempotency_key } })
    }

    pub fn cart_id(&self) -> &CartId {
        &self.snapshot.cart_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub cart_id: CartId,
    pub status_code: u16,
    /// Endpoint payload, passed through untouched.
    pub acknowledgment: Value,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionFailure {
    pub error: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl From<&EndpointError> for SubmissionFailure {
    fn from(error: &EndpointError) -> Self {
        Self {
            error: error.to_string(),
            retryable: error.is_retryable(),
            status_code: error.status_code(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderResult {
    Submitted(OrderReceipt),
    Failed(SubmissionFailure),
}

impl OrderResult {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted(_))
    }
}

/// Turns a cart into one outbound order request. Never retries and never
/// touches the cart it was given.
pub struct OrderSubmissionPipeline {
    endpoint: Arc<dyn OrderEndpoint>,
    carts: Arc<dyn CartRepository>,
    timeout: Duration,
}

impl OrderSubmissionPipeline {
    pub fn new(
        endpoint: Arc<dyn OrderEndpoint>,
        carts: Arc<dyn CartRepository>,
        timeout: Duration,
    ) -> Self {
        Self { endpoint, carts, timeout }
    }

    pub async fn submit(&self, cart: &Cart) -> Result<OrderResult, ApplicationError> {
        let prepared = PreparedOrder::from_cart(cart)?;
        Ok(self.send(&prepared).await)
    }

    /// Submits the cart as currently stored rather than any in-memory copy.
    pub async fn upload_cart(&self, user_id: &UserId) -> Result<OrderResult, ApplicationError> {
        let cart = self.carts.find_by_user(user_id).await?.ok_or(DomainError::EmptyCart)?;
        self.submit(&cart).await
    }

    pub async fn send(&self, prepared: &PreparedOrder) -> OrderResult {
        let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let response = tokio::time::timeout(self.timeout, self.endpoint.submit(&prepared.request))
            .await
            .unwrap_or(Err(EndpointError::Timeout { after_ms }));

        match response {
            Ok(acknowledgment) => {
                info!(
                    event_name = "order.submitted",
                    cart_id = %prepared.cart_id(),
                    status_code = acknowledgment.status_code,
                    idempotency_key = %prepared.request.idempotency_key,
                    "order accepted by endpoint"
                );
                OrderResult::Submitted(OrderReceipt {
                    cart_id: prepared.cart_id().clone(),
                    status_code: acknowledgment.status_code,
                    acknowledgment: acknowledgment.body,
                    idempotency_key: prepared.request.idempotency_key.clone(),
                })
            }
            Err(error) => {
                warn!(
                    event_name = "order.submission_failed",
                    cart_id = %prepared.cart_id(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "order submission failed"
                );
                OrderResult::Failed(SubmissionFailure::from(&error))
            }
        }
    }
}
