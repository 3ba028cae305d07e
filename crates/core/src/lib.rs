pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use chrono;
pub use rust_decimal;

pub use domain::cart::{
    Cart, CartId, CartLine, CartMutation, CartSummary, CartView, ProductInfo, UserId, VariantId,
    CURRENCY_SYMBOL,
};
pub use domain::catalog::{Catalog, CatalogError, CatalogProduct};
pub use domain::conversation::{
    ConversationEntry, ConversationLog, DEFAULT_CONTEXT_WINDOW, MAX_CONVERSATION_ENTRIES,
};
pub use domain::order::{OrderLine, OrderSnapshot};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState, FlowTransitionError, ShoppingFlow,
    TransitionOutcome,
};
