//! Session API the dialogue front end drives.
//!
//! - `GET    /api/v1/sessions/{user_id}`          greeting and flow state
//! - `DELETE /api/v1/sessions/{user_id}`          reset the conversation, keep the cart
//! - `POST   /api/v1/sessions/{user_id}/actions`  execute a routed action
//! - `POST   /api/v1/sessions/{user_id}/turns`    handle or record a conversational turn
//! - `GET    /api/v1/sessions/{user_id}/cart`     current cart view
//! - `GET    /api/v1/sessions/{user_id}/context`  recent conversation context

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cartkeeper_agent::{ActionOutcome, ActionResponse, SessionAction, ShoppingAgent};
use cartkeeper_core::{ApplicationError, CartView, DomainError, FlowState, InterfaceError, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    agent: Arc<ShoppingAgent>,
}

pub fn router(agent: Arc<ShoppingAgent>) -> Router {
    Router::new()
        .route("/api/v1/sessions/{user_id}", get(session_summary).delete(reset_session))
        .route("/api/v1/sessions/{user_id}/actions", post(perform_action))
        .route("/api/v1/sessions/{user_id}/turns", post(handle_turn))
        .route("/api/v1/sessions/{user_id}/cart", get(view_cart))
        .route("/api/v1/sessions/{user_id}/context", get(conversation_context))
        .with_state(ApiState { agent })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Without `agent_response` the server routes the input itself; with it the
/// caller already answered and the turn is only recorded.
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub user_input: String,
    #[serde(default)]
    pub agent_response: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TurnRecorded {
    pub user_id: UserId,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub user_id: UserId,
    pub state: FlowState,
    pub greeting: String,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub user_id: UserId,
    pub context: String,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &self.0 {
            InterfaceError::BadRequest { message, .. }
            | InterfaceError::ServiceUnavailable { message, .. }
            | InterfaceError::Internal { message, .. } => message.clone(),
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

fn fail(error: ApplicationError, correlation_id: &str) -> ApiError {
    warn!(
        event_name = "api.request_failed",
        correlation_id,
        error = %error,
        "session request failed"
    );
    ApiError(error.into_interface(correlation_id))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn user_id(raw: String, correlation_id: &str) -> Result<UserId, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(fail(DomainError::validation("user_id is required").into(), correlation_id));
    }
    Ok(UserId::from(trimmed))
}

/// Rejections are answered, not failed: the body still carries state.
fn outcome_status(outcome: &ActionOutcome) -> StatusCode {
    match outcome {
        ActionOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ActionOutcome::OrderFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn perform_action(
    Path(raw_user_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(action): Json<SessionAction>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = user_id(raw_user_id, &correlation_id)?;

    let response = state
        .agent
        .coordinator()
        .perform(&user_id, action, &correlation_id)
        .await
        .map_err(|error| fail(error, &correlation_id))?;

    info!(
        event_name = "api.action_performed",
        correlation_id = %correlation_id,
        user_id = %user_id,
        state = ?response.state,
        "session action performed"
    );
    Ok((outcome_status(&response.outcome), Json(response)))
}

pub async fn handle_turn(
    Path(raw_user_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<TurnRequest>,
) -> Result<Response, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = user_id(raw_user_id, &correlation_id)?;
    if request.user_input.trim().is_empty() {
        let error = DomainError::validation("user_input is required");
        return Err(fail(error.into(), &correlation_id));
    }

    match request.agent_response {
        Some(agent_response) => {
            let entries = state
                .agent
                .coordinator()
                .record_turn(&user_id, &request.user_input, &agent_response)
                .await
                .map_err(|error| fail(error, &correlation_id))?;
            Ok(Json(TurnRecorded { user_id, entries }).into_response())
        }
        None => {
            let reply = state
                .agent
                .handle_turn(&user_id, &request.user_input, &correlation_id)
                .await
                .map_err(|error| fail(error, &correlation_id))?;
            Ok(Json(reply).into_response())
        }
    }
}

pub async fn view_cart(
    Path(raw_user_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CartView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = user_id(raw_user_id, &correlation_id)?;

    let view = state
        .agent
        .coordinator()
        .cart_view(&user_id)
        .await
        .map_err(|error| fail(error, &correlation_id))?;
    Ok(Json(view))
}

pub async fn conversation_context(
    Path(raw_user_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ContextResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = user_id(raw_user_id, &correlation_id)?;
    let coordinator = state.agent.coordinator();

    let context =
        coordinator.recent_context(&user_id).await.map_err(|error| fail(error, &correlation_id))?;
    let entries =
        coordinator.history(&user_id).await.map_err(|error| fail(error, &correlation_id))?.len();
    Ok(Json(ContextResponse { user_id, context, entries }))
}

pub async fn session_summary(
    Path(raw_user_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<SessionSummary>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = user_id(raw_user_id, &correlation_id)?;

    let greeting =
        state.agent.greeting(&user_id).await.map_err(|error| fail(error, &correlation_id))?;
    let flow_state = state.agent.coordinator().state(&user_id).await;
    Ok(Json(SessionSummary { user_id, state: flow_state, greeting }))
}

pub async fn reset_session(
    Path(raw_user_id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ActionResponse>, ApiError> {
    let correlation_id = correlation_id(&headers);
    let user_id = user_id(raw_user_id, &correlation_id)?;

    let response = state
        .agent
        .coordinator()
        .perform(&user_id, SessionAction::Reset, &correlation_id)
        .await
        .map_err(|error| fail(error, &correlation_id))?;
    Ok(Json(response))
}
