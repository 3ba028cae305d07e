use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use cartkeeper_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use cartkeeper_core::config::{AppConfig, CheckoutConfig};
use cartkeeper_core::{
    ApplicationError, Cart, CartMutation, CartView, Catalog, CatalogProduct, ConversationEntry,
    DomainError, FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState, ProductInfo,
    ShoppingFlow, TransitionOutcome, UserId, VariantId,
};
use cartkeeper_db::{CartRepository, ConversationRepository};

use crate::audit::TracingAuditSink;
use crate::cart_store::{CartOutcome, CartStore};
use crate::dialogue::{CartCommand, CartOp, RoutedAction};
use crate::endpoint::{CartAllocator, CatalogService, EndpointError, OrderEndpoint};
use crate::memory::ConversationMemoryStore;
use crate::orders::{
    OrderReceipt, OrderResult, OrderSubmissionPipeline, PreparedOrder, SubmissionFailure,
};

const ACTOR: &str = "cart-session-coordinator";

/// Bounded exponential backoff for resubmitting a confirmed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 250, max_delay_ms: 2_000 }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CheckoutConfig) -> Self {
        Self {
            max_attempts: config.max_submit_attempts.max(1),
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// Delay before retry number `retry` (zero based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Something a user asked the session to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionAction {
    Browse,
    Cart(CartCommand),
    Checkout,
    Confirm,
    Decline,
    Reset,
}

impl SessionAction {
    /// `Respond` carries nothing to execute.
    pub fn from_routed(action: RoutedAction) -> Option<Self> {
        match action {
            RoutedAction::Browse => Some(Self::Browse),
            RoutedAction::Cart(command) => Some(Self::Cart(command)),
            RoutedAction::Checkout => Some(Self::Checkout),
            RoutedAction::Confirm => Some(Self::Confirm),
            RoutedAction::Decline => Some(Self::Decline),
            RoutedAction::Respond => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    CatalogPresented {
        products: Vec<CatalogProduct>,
        categories: Vec<String>,
    },
    CartUpdated {
        mutation: CartMutation,
    },
    CartViewed {
        view: CartView,
    },
    /// Validation, not-found and flow rejections. Nothing was changed.
    Rejected {
        error: String,
    },
    CheckoutSummary {
        view: CartView,
    },
    OrderSubmitted {
        receipt: OrderReceipt,
        attempts: u32,
    },
    OrderFailed {
        failure: SubmissionFailure,
        attempts: u32,
    },
    CheckoutCancelled,
    SessionReset,
}

impl ActionOutcome {
    fn rejected(error: impl Into<DomainError>) -> Self {
        Self::Rejected { error: error.into().to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub state: FlowState,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

#[derive(Debug)]
struct UserSession {
    state: FlowState,
    cart: Option<Cart>,
    /// The stored record still holds lines of an order that was already placed.
    record_stale: bool,
    last_active: Instant,
}

impl UserSession {
    fn new() -> Self {
        Self {
            state: FlowState::Idle,
            cart: None,
            record_stale: false,
            last_active: Instant::now(),
        }
    }

    /// Nothing here that a reload from storage would not reproduce.
    fn is_evictable(&self) -> bool {
        matches!(self.state, FlowState::Idle | FlowState::OrderSubmitted) && !self.record_stale
    }

    /// Abandoned mid-flow. Dropping it returns the user to `Idle` with their stored cart.
    fn is_expired(&self, idle_ttl: Duration) -> bool {
        !self.record_stale && self.last_active.elapsed() >= idle_ttl
    }
}

type SessionHandle = Arc<AsyncMutex<UserSession>>;

/// Exclusive access to one user's session, held until dropped.
///
/// Every call made through a scope runs under the same lock, so a whole
/// conversational turn can be ordered against other requests for that user.
pub struct SessionScope<'a> {
    coordinator: &'a CartSessionCoordinator,
    user_id: UserId,
    handle: SessionHandle,
    session: OwnedMutexGuard<UserSession>,
}

impl SessionScope<'_> {
    pub fn state(&self) -> FlowState {
        self.session.state
    }

    pub async fn perform(
        &mut self,
        action: SessionAction,
        correlation_id: &str,
    ) -> Result<ActionResponse, ApplicationError> {
        self.coordinator.dispatch(&self.user_id, &mut self.session, action, correlation_id).await
    }

    pub async fn cart_view(&mut self) -> Result<CartView, ApplicationError> {
        Ok(self.coordinator.loaded_cart(&self.user_id, &mut self.session).await?.view())
    }

    pub async fn record_turn(
        &self,
        user_input: &str,
        agent_response: &str,
    ) -> Result<usize, ApplicationError> {
        self.coordinator.memory.append(&self.user_id, user_input, agent_response).await
    }

    pub async fn recent_context(&self) -> Result<String, ApplicationError> {
        self.coordinator.memory.recent_context(&self.user_id).await
    }

    pub async fn history(&self) -> Result<Vec<ConversationEntry>, ApplicationError> {
        self.coordinator.memory.history(&self.user_id).await
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        self.session.last_active = Instant::now();
        if self.session.is_evictable() {
            self.coordinator.evict_if_unused(&self.user_id, &self.handle);
        }
    }
}

/// Serializes every operation per user and drives the shopping flow.
///
/// Each user's session lock is held for the whole operation, including
/// storage writes and outbound calls, and released when the call returns.
/// Sessions that storage can fully reproduce leave the registry once
/// nothing holds them.
pub struct CartSessionCoordinator {
    carts: CartStore,
    memory: ConversationMemoryStore,
    orders: OrderSubmissionPipeline,
    catalog: Arc<dyn CatalogService>,
    engine: FlowEngine<ShoppingFlow>,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
    catalog_timeout: Duration,
    session_idle_ttl: Duration,
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl CartSessionCoordinator {
    pub fn new(
        carts: CartStore,
        memory: ConversationMemoryStore,
        orders: OrderSubmissionPipeline,
        catalog: Arc<dyn CatalogService>,
    ) -> Self {
        Self {
            carts,
            memory,
            orders,
            catalog,
            engine: FlowEngine::default(),
            audit: Arc::new(TracingAuditSink),
            retry: RetryPolicy::default(),
            catalog_timeout: Duration::from_secs(10),
            session_idle_ttl: Duration::from_secs(1_800),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Wires stores and pipeline from configuration around a single commerce client.
    pub fn from_config<C>(
        config: &AppConfig,
        cart_repository: Arc<dyn CartRepository>,
        conversation_repository: Arc<dyn ConversationRepository>,
        commerce: Arc<C>,
    ) -> Self
    where
        C: CartAllocator + OrderEndpoint + CatalogService + 'static,
    {
        let timeout = Duration::from_secs(config.commerce.request_timeout_secs);
        let carts = CartStore::new(cart_repository.clone(), commerce.clone(), timeout);
        let memory =
            ConversationMemoryStore::new(conversation_repository, config.memory.context_window);
        let orders = OrderSubmissionPipeline::new(commerce.clone(), cart_repository, timeout);

        Self::new(carts, memory, orders, commerce)
            .with_retry_policy(RetryPolicy::from_config(&config.checkout))
            .with_catalog_timeout(timeout)
            .with_session_idle_ttl(Duration::from_secs(config.memory.session_idle_secs))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_catalog_timeout(mut self, timeout: Duration) -> Self {
        self.catalog_timeout = timeout;
        self
    }

    pub fn with_session_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.session_idle_ttl = idle_ttl;
        self
    }

    /// Locks the user's session for a sequence of operations.
    pub async fn scope(&self, user_id: &UserId) -> SessionScope<'_> {
        let handle = self.session(user_id);
        let session = handle.clone().lock_owned().await;
        SessionScope { coordinator: self, user_id: user_id.clone(), handle, session }
    }

    pub async fn perform(
        &self,
        user_id: &UserId,
        action: SessionAction,
        correlation_id: &str,
    ) -> Result<ActionResponse, ApplicationError> {
        self.scope(user_id).await.perform(action, correlation_id).await
    }

    pub async fn state(&self, user_id: &UserId) -> FlowState {
        self.scope(user_id).await.state()
    }

    pub async fn cart_view(&self, user_id: &UserId) -> Result<CartView, ApplicationError> {
        self.scope(user_id).await.cart_view().await
    }

    pub async fn record_turn(
        &self,
        user_id: &UserId,
        user_input: &str,
        agent_response: &str,
    ) -> Result<usize, ApplicationError> {
        self.scope(user_id).await.record_turn(user_input, agent_response).await
    }

    pub async fn recent_context(&self, user_id: &UserId) -> Result<String, ApplicationError> {
        self.scope(user_id).await.recent_context().await
    }

    pub async fn history(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationEntry>, ApplicationError> {
        self.scope(user_id).await.history().await
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<UserId, SessionHandle>> {
        match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registering a new user first sweeps out sessions idle past the TTL.
    fn session(&self, user_id: &UserId) -> SessionHandle {
        let mut sessions = self.sessions();
        if let Some(handle) = sessions.get(user_id) {
            return handle.clone();
        }

        let idle_ttl = self.session_idle_ttl;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            // Held or queued sessions are in use, whatever their age.
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            let expired = handle.try_lock().is_ok_and(|session| session.is_expired(idle_ttl));
            !expired
        });
        let swept = before - sessions.len();
        if swept > 0 {
            debug!(event_name = "session.swept", swept, "expired idle sessions");
        }

        sessions
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(UserSession::new())))
            .clone()
    }

    /// Called from a dropping scope. The registry, the scope's handle and its
    /// guard are then the only references unless another request is queued.
    /// Handles are only cloned under the registry lock, so none can appear
    /// while this runs.
    fn evict_if_unused(&self, user_id: &UserId, handle: &SessionHandle) {
        let mut sessions = self.sessions();
        let registered = sessions.get(user_id).is_some_and(|entry| Arc::ptr_eq(entry, handle));
        if registered && Arc::strong_count(handle) == 3 {
            sessions.remove(user_id);
            debug!(event_name = "session.evicted", user_id = %user_id, "idle session released");
        }
    }

    async fn dispatch(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        action: SessionAction,
        correlation_id: &str,
    ) -> Result<ActionResponse, ApplicationError> {
        let outcome = match action {
            SessionAction::Browse => self.browse(user_id, session, correlation_id).await?,
            SessionAction::Cart(command) => {
                self.cart_action(user_id, session, command, correlation_id).await?
            }
            SessionAction::Checkout => self.checkout(user_id, session, correlation_id).await?,
            SessionAction::Confirm => self.confirm(user_id, session, correlation_id).await?,
            SessionAction::Decline => {
                let declined = FlowEvent::ConfirmationDeclined;
                match self.transition(user_id, session, declined, correlation_id) {
                    Ok(transition) => {
                        session.state = transition.to;
                        ActionOutcome::CheckoutCancelled
                    }
                    Err(error) => ActionOutcome::rejected(error),
                }
            }
            SessionAction::Reset => self.reset(user_id, session, correlation_id).await?,
        };

        Ok(ActionResponse { state: session.state, outcome })
    }

    async fn loaded_cart<'a>(
        &self,
        user_id: &UserId,
        session: &'a mut UserSession,
    ) -> Result<&'a mut Cart, ApplicationError> {
        let cart = match session.cart.take() {
            Some(cart) => cart,
            None => self.carts.load(user_id).await?,
        };
        Ok(session.cart.insert(cart))
    }

    fn transition(
        &self,
        user_id: &UserId,
        session: &UserSession,
        event: FlowEvent,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        let audit = Self::audit_context(user_id, session, correlation_id);
        let context = FlowContext::with_cart_lines(
            session.cart.as_ref().map_or(0, |cart| cart.items().len()),
        );
        Ok(self.engine.apply_with_audit(
            &session.state,
            &event,
            &context,
            self.audit.as_ref(),
            &audit,
        )?)
    }

    fn audit_context(
        user_id: &UserId,
        session: &UserSession,
        correlation_id: &str,
    ) -> AuditContext {
        AuditContext::new(
            user_id.clone(),
            session.cart.as_ref().map(|cart| cart.cart_id.clone()),
            correlation_id,
            ACTOR,
        )
    }

    async fn browse(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ApplicationError> {
        let transition =
            match self.transition(user_id, session, FlowEvent::BrowseRequested, correlation_id) {
                Ok(transition) => transition,
                Err(error) => return Ok(ActionOutcome::rejected(error)),
            };
        if transition.requires(FlowAction::DiscardPendingCheckout) {
            session.state = transition.to;
            return Ok(ActionOutcome::CheckoutCancelled);
        }

        let catalog = self.fetch_catalog().await.map_err(|error| {
            ApplicationError::Integration(format!("catalog unavailable: {error}"))
        })?;
        session.state = transition.to;
        Ok(ActionOutcome::CatalogPresented {
            categories: catalog.categories().into_iter().map(str::to_owned).collect(),
            products: catalog.products().to_vec(),
        })
    }

    async fn cart_action(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        command: CartCommand,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ApplicationError> {
        // The line count is irrelevant to this event, so the cart can load afterwards.
        let transition =
            match self.transition(user_id, session, FlowEvent::CartActionRequested, correlation_id)
            {
                Ok(transition) => transition,
                Err(error) => return Ok(ActionOutcome::rejected(error)),
            };
        if transition.requires(FlowAction::DiscardPendingCheckout) {
            session.state = transition.to;
            return Ok(ActionOutcome::CheckoutCancelled);
        }

        let catalog_product = match (command.op, command.variant_id.as_ref()) {
            (CartOp::Add, Some(variant_id)) => match self.catalog_product(variant_id).await? {
                Ok(product) => product,
                Err(rejection) => return Ok(rejection),
            },
            _ => None,
        };
        let action = match command.into_action(catalog_product) {
            Ok(action) => action,
            Err(error) => return Ok(ActionOutcome::rejected(error)),
        };

        let cart = self.loaded_cart(user_id, session).await?;
        let outcome = match self.carts.apply(user_id, cart, action).await? {
            CartOutcome::Applied(mutation) => {
                // The write replaced whatever the stored record held.
                session.record_stale = false;
                self.audit.emit(
                    Self::audit_context(user_id, session, correlation_id)
                        .event("cart.mutation_applied", AuditCategory::Cart, AuditOutcome::Success)
                        .with_metadata("action", mutation.action.clone()),
                );
                ActionOutcome::CartUpdated { mutation }
            }
            CartOutcome::Viewed(view) => ActionOutcome::CartViewed { view },
            CartOutcome::Rejected(error) => {
                self.audit.emit(
                    Self::audit_context(user_id, session, correlation_id)
                        .event(
                            "cart.mutation_rejected",
                            AuditCategory::Cart,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                );
                ActionOutcome::rejected(error)
            }
        };
        session.state = transition.to;
        Ok(outcome)
    }

    /// `Ok(Ok(Some))` is the catalog's own product info. A catalog that is not
    /// configured yields `Ok(Ok(None))` so supplied details are used instead.
    async fn catalog_product(
        &self,
        variant_id: &VariantId,
    ) -> Result<Result<Option<ProductInfo>, ActionOutcome>, ApplicationError> {
        match self.fetch_catalog().await {
            Ok(catalog) => match catalog.find(variant_id) {
                Some(product) => Ok(Ok(Some(product.product_info()))),
                None => Ok(Err(ActionOutcome::rejected(DomainError::validation(format!(
                    "Unknown product variant {variant_id}"
                ))))),
            },
            Err(EndpointError::NotConfigured(_)) => Ok(Ok(None)),
            Err(error) => {
                Err(ApplicationError::Integration(format!("catalog unavailable: {error}")))
            }
        }
    }

    async fn checkout(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ApplicationError> {
        self.loaded_cart(user_id, session).await?;
        let transition =
            match self.transition(user_id, session, FlowEvent::CheckoutRequested, correlation_id) {
                Ok(transition) => transition,
                Err(error) => return Ok(ActionOutcome::rejected(error)),
            };

        let cart = self.loaded_cart(user_id, session).await?;
        if !self.carts.ensure_allocated(user_id, cart).await? {
            return Ok(ActionOutcome::rejected(DomainError::MissingCartId));
        }
        let view = cart.view();
        session.state = transition.to;
        Ok(ActionOutcome::CheckoutSummary { view })
    }

    async fn confirm(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ApplicationError> {
        if session.state == FlowState::AwaitingConfirmation {
            self.loaded_cart(user_id, session).await?;
        }
        let confirmed =
            self.transition(user_id, session, FlowEvent::OrderConfirmed, correlation_id);
        if let Err(error) = confirmed {
            return Ok(ActionOutcome::rejected(error));
        }

        let cart = self.loaded_cart(user_id, session).await?;
        let prepared = match PreparedOrder::from_cart(cart) {
            Ok(prepared) => prepared,
            Err(ApplicationError::Domain(error)) => return Ok(ActionOutcome::rejected(error)),
            Err(error) => return Err(error),
        };

        let (result, attempts) = self.submit_with_retry(user_id, &prepared).await;
        match result {
            OrderResult::Submitted(receipt) => {
                let transition =
                    self.transition(user_id, session, FlowEvent::OrderAccepted, correlation_id)?;
                self.audit.emit(
                    Self::audit_context(user_id, session, correlation_id)
                        .event("order.submitted", AuditCategory::Order, AuditOutcome::Success)
                        .with_metadata("attempts", attempts.to_string()),
                );
                info!(
                    event_name = "order.accepted",
                    correlation_id,
                    user_id = %user_id,
                    cart_id = %receipt.cart_id,
                    attempts,
                    "order placed"
                );
                session.state = transition.to;
                if transition.requires(FlowAction::ClearCart) {
                    self.retire_ordered_cart(user_id, session, &receipt, correlation_id).await?;
                }
                Ok(ActionOutcome::OrderSubmitted { receipt, attempts })
            }
            OrderResult::Failed(failure) => {
                let transition =
                    self.transition(user_id, session, FlowEvent::OrderFailed, correlation_id)?;
                self.audit.emit(
                    Self::audit_context(user_id, session, correlation_id)
                        .event("order.failed", AuditCategory::Order, AuditOutcome::Failed)
                        .with_metadata("attempts", attempts.to_string())
                        .with_metadata("retryable", failure.retryable.to_string()),
                );
                session.state = transition.to;
                Ok(ActionOutcome::OrderFailed { failure, attempts })
            }
        }
    }

    /// Makes sure the lines of a placed order cannot be loaded or uploaded again.
    ///
    /// The stored cart is replaced by a fresh one, or removed when that write
    /// fails. If neither reaches storage the caller gets a storage error naming
    /// the placed order, and the session keeps an empty cart so this process
    /// does not offer the old lines again.
    async fn retire_ordered_cart(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        receipt: &OrderReceipt,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let replace_error = match self.carts.start_fresh(user_id).await {
            Ok(fresh) => {
                session.cart = Some(fresh);
                return Ok(());
            }
            Err(error) => error,
        };
        warn!(
            event_name = "cart.reset_failed",
            correlation_id,
            user_id = %user_id,
            error = %replace_error,
            "fresh cart could not be stored; removing the ordered cart"
        );

        match self.carts.discard(user_id).await {
            Ok(_) => {
                // Loaded and allocated again on next use.
                session.cart = None;
                Ok(())
            }
            Err(discard_error) => {
                error!(
                    event_name = "cart.ordered_cart_retained",
                    correlation_id,
                    user_id = %user_id,
                    cart_id = %receipt.cart_id,
                    error = %discard_error,
                    "order placed but its cart is still stored"
                );
                session.cart = Some(Cart::degraded(discard_error.to_string()));
                session.record_stale = true;
                Err(ApplicationError::Storage(format!(
                    "order for cart {} was placed, but the stored cart could not be cleared: \
                     {discard_error}",
                    receipt.cart_id
                )))
            }
        }
    }

    async fn submit_with_retry(
        &self,
        user_id: &UserId,
        prepared: &PreparedOrder,
    ) -> (OrderResult, u32) {
        let mut attempt = 1;
        loop {
            let result = self.orders.send(prepared).await;
            let retryable = matches!(&result, OrderResult::Failed(failure) if failure.retryable);
            if !retryable || attempt >= self.retry.max_attempts {
                return (result, attempt);
            }

            let delay = self.retry.backoff(attempt - 1);
            warn!(
                event_name = "order.retry_scheduled",
                user_id = %user_id,
                cart_id = %prepared.cart_id(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying order submission"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn reset(
        &self,
        user_id: &UserId,
        session: &mut UserSession,
        correlation_id: &str,
    ) -> Result<ActionOutcome, ApplicationError> {
        let transition =
            self.transition(user_id, session, FlowEvent::SessionReset, correlation_id)?;
        self.memory.clear(user_id).await?;
        self.audit.emit(
            Self::audit_context(user_id, session, correlation_id)
                .event("memory.cleared", AuditCategory::Memory, AuditOutcome::Success),
        );
        session.state = transition.to;
        Ok(ActionOutcome::SessionReset)
    }

    async fn fetch_catalog(&self) -> Result<Catalog, EndpointError> {
        let after_ms = u64::try_from(self.catalog_timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(self.catalog_timeout, self.catalog.fetch_catalog())
            .await
            .unwrap_or(Err(EndpointError::Timeout { after_ms }))
    }
}
