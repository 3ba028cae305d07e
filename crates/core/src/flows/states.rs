use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Idle,
    Browsing,
    Ordering,
    AwaitingConfirmation,
    OrderSubmitted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    BrowseRequested,
    CartActionRequested,
    CheckoutRequested,
    OrderConfirmed,
    OrderAccepted,
    OrderFailed,
    ConfirmationDeclined,
    SessionReset,
}

/// Facts about the session the transition table needs to consult.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub cart_line_count: usize,
}

impl FlowContext {
    pub fn with_cart_lines(cart_line_count: usize) -> Self {
        Self { cart_line_count }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    PresentCatalog,
    ApplyCartAction,
    PresentCheckoutSummary,
    SubmitOrder,
    ClearCart,
    DiscardPendingCheckout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn requires(&self, action: FlowAction) -> bool {
        self.actions.contains(&action)
    }
}
