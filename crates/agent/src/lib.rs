//! Session runtime for the shopping assistant.
//!
//! Owns the per-user cart and conversation stores, the order submission
//! pipeline, and the coordinator that serializes each user's operations and
//! drives the shopping flow. External commerce services sit behind the traits
//! in [`endpoint`]; [`http`] provides the `reqwest` implementations.
//!
//! The dialogue layer only routes text to actions. Prices, cart contents and
//! order submission are decided here.

pub mod audit;
pub mod cart_store;
pub mod coordinator;
pub mod dialogue;
pub mod endpoint;
pub mod http;
pub mod memory;
pub mod orders;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use audit::TracingAuditSink;
pub use cart_store::{CartAction, CartOutcome, CartStore};
pub use coordinator::{
    ActionOutcome, ActionResponse, CartSessionCoordinator, RetryPolicy, SessionAction,
    SessionScope,
};
pub use dialogue::{
    CartCommand, CartOp, DialogueReply, DialogueRequest, DialogueService, KeywordDialogue,
    RoutedAction,
};
pub use endpoint::{
    CartAllocator, CatalogService, EndpointError, OrderAcknowledgment, OrderEndpoint,
    OrderRequest,
};
pub use http::{CommerceUrls, HttpCommerceClient};
pub use memory::ConversationMemoryStore;
pub use orders::{
    OrderReceipt, OrderResult, OrderSubmissionPipeline, PreparedOrder, SubmissionFailure,
};
pub use runtime::{ShoppingAgent, TurnReply};
