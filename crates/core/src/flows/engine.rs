use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Browse, fill the cart, confirm, submit.
#[derive(Clone, Debug, Default)]
pub struct ShoppingFlow;

impl FlowDefinition for ShoppingFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Idle
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_shopping(current, event, context)
    }
}

#[derive(Clone, Debug)]
pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    audit
                        .event("flow.transition_applied", AuditCategory::Flow, AuditOutcome::Success)
                        .with_metadata("from", format!("{:?}", outcome.from))
                        .with_metadata("to", format!("{:?}", outcome.to))
                        .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event("flow.transition_rejected", AuditCategory::Flow, AuditOutcome::Rejected)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<ShoppingFlow> {
    fn default() -> Self {
        Self::new(ShoppingFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("Cannot create order from empty cart")]
    EmptyCart { state: FlowState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_shopping(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ApplyCartAction, ClearCart, DiscardPendingCheckout, PresentCatalog,
        PresentCheckoutSummary, SubmitOrder,
    };
    use FlowEvent::{
        BrowseRequested, CartActionRequested, CheckoutRequested, ConfirmationDeclined,
        OrderAccepted, OrderConfirmed, OrderFailed, SessionReset,
    };
    use FlowState::{AwaitingConfirmation, Browsing, Idle, OrderSubmitted, Ordering};

    let empty_cart = || FlowTransitionError::EmptyCart { state: *current };

    let (to, actions) = match (current, event) {
        (_, SessionReset) => (Idle, Vec::new()),
        (Idle | Browsing | Ordering | OrderSubmitted, BrowseRequested) => {
            (Browsing, vec![PresentCatalog])
        }
        (Idle | Browsing | Ordering | OrderSubmitted, CartActionRequested) => {
            (Ordering, vec![ApplyCartAction])
        }
        (Idle | Browsing | Ordering | OrderSubmitted | AwaitingConfirmation, CheckoutRequested) => {
            if context.cart_line_count == 0 {
                return Err(empty_cart());
            }
            (AwaitingConfirmation, vec![PresentCheckoutSummary])
        }
        (AwaitingConfirmation, OrderConfirmed) => {
            if context.cart_line_count == 0 {
                return Err(empty_cart());
            }
            (AwaitingConfirmation, vec![SubmitOrder])
        }
        (AwaitingConfirmation, OrderAccepted) => (OrderSubmitted, vec![ClearCart]),
        (AwaitingConfirmation, OrderFailed) => (AwaitingConfirmation, Vec::new()),
        // Anything but an explicit yes abandons the pending checkout and
        // carries no side effect of its own.
        (AwaitingConfirmation, ConfirmationDeclined | BrowseRequested | CartActionRequested) => {
            (Ordering, vec![DiscardPendingCheckout])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
