use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use cartkeeper_core::{ApplicationError, FlowState, UserId};

use crate::coordinator::{ActionOutcome, CartSessionCoordinator, SessionAction};
use crate::dialogue::{DialogueRequest, DialogueService, RoutedAction};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub response: String,
    pub state: FlowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ActionOutcome>,
    /// False when the turn was handled but could not be written to the conversation log.
    pub memory_recorded: bool,
}

/// One conversational turn: memory, routing, execution, then recording, all
/// under the user's session lock.
pub struct ShoppingAgent {
    coordinator: Arc<CartSessionCoordinator>,
    dialogue: Arc<dyn DialogueService>,
}

impl ShoppingAgent {
    pub fn new(
        coordinator: Arc<CartSessionCoordinator>,
        dialogue: Arc<dyn DialogueService>,
    ) -> Self {
        Self { coordinator, dialogue }
    }

    pub fn coordinator(&self) -> &Arc<CartSessionCoordinator> {
        &self.coordinator
    }

    pub async fn greeting(&self, user_id: &UserId) -> Result<String, ApplicationError> {
        let previous = self.coordinator.history(user_id).await?.len();
        Ok(if previous == 0 {
            "Hello! I can help you browse products and build your order.".to_owned()
        } else {
            format!("Welcome back! I have {previous} previous conversations with you.")
        })
    }

    pub async fn handle_turn(
        &self,
        user_id: &UserId,
        user_input: &str,
        correlation_id: &str,
    ) -> Result<TurnReply, ApplicationError> {
        let mut session = self.coordinator.scope(user_id).await;
        let state = session.state();
        let request = DialogueRequest {
            user_id: user_id.clone(),
            user_input: user_input.to_owned(),
            memory_context: session.recent_context().await?,
            state,
        };
        let routed = self.dialogue.route(&request).await.map_err(|error| {
            ApplicationError::Integration(format!("dialogue service unavailable: {error}"))
        })?;

        // Small talk during checkout still counts as "not yes".
        let action = match routed.action {
            RoutedAction::Respond if state == FlowState::AwaitingConfirmation => {
                Some(SessionAction::Decline)
            }
            other => SessionAction::from_routed(other),
        };

        let (response, state, outcome) = match action {
            Some(action) => {
                let executed = session.perform(action, correlation_id).await?;
                let response = describe(&executed.outcome, &routed.response);
                (response, executed.state, Some(executed.outcome))
            }
            None => (routed.response, state, None),
        };

        let memory_recorded = match session.record_turn(user_input, &response).await {
            Ok(_) => true,
            Err(error) => {
                warn!(
                    event_name = "memory.record_failed",
                    correlation_id,
                    user_id = %user_id,
                    error = %error,
                    "turn handled but not recorded"
                );
                false
            }
        };
        info!(
            event_name = "agent.turn_handled",
            correlation_id,
            user_id = %user_id,
            state = ?state,
            memory_recorded,
            "turn handled"
        );
        Ok(TurnReply { response, state, outcome, memory_recorded })
    }
}

/// User-facing text for an outcome; the dialogue's own wording is used when
/// nothing more specific applies.
fn describe(outcome: &ActionOutcome, fallback: &str) -> String {
    match outcome {
        ActionOutcome::CatalogPresented { products, .. } => {
            let mut text = String::from("Here is what we have:");
            for product in products {
                text.push_str(&format!(
                    "\n- {} ({}) {}",
                    product.product_name, product.variant_id, product.price
                ));
            }
            text
        }
        ActionOutcome::CartUpdated { mutation } => format!(
            "{}. Your cart has {} item(s), total {}{}.",
            mutation.action,
            mutation.summary.total_quantity,
            mutation.summary.currency,
            mutation.summary.total_amount
        ),
        ActionOutcome::CartViewed { view } | ActionOutcome::CheckoutSummary { view }
            if view.cart_empty =>
        {
            view.message.clone().unwrap_or_else(|| fallback.to_owned())
        }
        ActionOutcome::CartViewed { view } => {
            let mut text = String::from("Your cart:");
            for line in &view.items {
                text.push_str(&format!(
                    "\n- {} x{} = {}{}",
                    line.product_name,
                    line.quantity,
                    view.summary.currency,
                    line.subtotal()
                ));
            }
            let summary = &view.summary;
            text.push_str(&format!("\nTotal: {}{}", summary.currency, summary.total_amount));
            text
        }
        ActionOutcome::CheckoutSummary { view } => format!(
            "You are ordering {} item(s) for {}{}. Shall I place the order?",
            view.summary.total_quantity, view.summary.currency, view.summary.total_amount
        ),
        ActionOutcome::Rejected { error } => error.clone(),
        ActionOutcome::OrderSubmitted { .. } => {
            "Your order has been placed. Your cart is now empty.".to_owned()
        }
        ActionOutcome::OrderFailed { failure, .. } => format!(
            "I could not place your order ({}). Your cart is unchanged; say yes to try again.",
            failure.error
        ),
        ActionOutcome::CheckoutCancelled => {
            "Okay, I have not placed the order. Your cart is unchanged.".to_owned()
        }
        ActionOutcome::SessionReset => fallback.to_owned(),
    }
}
