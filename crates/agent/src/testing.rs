//! Scripted stand-ins for the commerce endpoints and storage, shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use cartkeeper_core::{Cart, CartId, Catalog, CatalogProduct, ConversationLog, UserId, VariantId};
use cartkeeper_db::{CartRepository, ConversationRepository, InMemoryCartRepository, RepositoryError};

use crate::endpoint::{
    CartAllocator, CatalogService, EndpointError, OrderAcknowledgment, OrderEndpoint,
    OrderRequest,
};

/// Hands out `cart_1`, `cart_2`, ... unless told to fail or stall.
#[derive(Default)]
pub struct SequenceAllocator {
    issued: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl SequenceAllocator {
    pub fn failing() -> Self {
        let allocator = Self::default();
        allocator.set_failing(true);
        allocator
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CartAllocator for SequenceAllocator {
    async fn allocate(&self) -> Result<CartId, EndpointError> {
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EndpointError::Transport("connection refused".to_owned()));
        }
        let next = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CartId::from(format!("cart_{next}")))
    }
}

/// Replies from a queue; once drained every call is acknowledged.
#[derive(Default)]
pub struct ScriptedOrderEndpoint {
    script: Mutex<VecDeque<Result<OrderAcknowledgment, EndpointError>>>,
    received: Mutex<Vec<OrderRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedOrderEndpoint {
    pub fn with_script(
        script: impl IntoIterator<Item = Result<OrderAcknowledgment, EndpointError>>,
    ) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), ..Self::default() }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn received(&self) -> Vec<OrderRequest> {
        self.received.lock().expect("received lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().expect("received lock").len()
    }
}

pub fn acknowledged() -> Result<OrderAcknowledgment, EndpointError> {
    Ok(OrderAcknowledgment { status_code: 200, body: json!({"ok": true, "order_id": "ord_1"}) })
}

pub fn unavailable() -> Result<OrderAcknowledgment, EndpointError> {
    Err(EndpointError::Status { status: 503, body: "maintenance".to_owned() })
}

pub fn rejected() -> Result<OrderAcknowledgment, EndpointError> {
    Err(EndpointError::Status { status: 422, body: "invalid variant".to_owned() })
}

#[async_trait]
impl OrderEndpoint for ScriptedOrderEndpoint {
    async fn submit(&self, request: &OrderRequest) -> Result<OrderAcknowledgment, EndpointError> {
        self.received.lock().expect("received lock").push(request.clone());
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().expect("script lock").pop_front();
        next.unwrap_or_else(acknowledged)
    }
}

pub struct StaticCatalog {
    catalog: Option<Catalog>,
}

impl StaticCatalog {
    pub fn grocery() -> Self {
        Self { catalog: Some(grocery_catalog()) }
    }

    pub fn unavailable() -> Self {
        Self { catalog: None }
    }
}

#[async_trait]
impl CatalogService for StaticCatalog {
    async fn fetch_catalog(&self) -> Result<Catalog, EndpointError> {
        self.catalog
            .clone()
            .ok_or_else(|| EndpointError::Transport("catalog offline".to_owned()))
    }
}

pub fn grocery_catalog() -> Catalog {
    Catalog::new(vec![
        CatalogProduct {
            variant_id: VariantId::from("v1"),
            product_name: "Brown bread".to_owned(),
            price: Decimal::new(45, 0),
            category: Some("Bakery".to_owned()),
        },
        CatalogProduct {
            variant_id: VariantId::from("v2"),
            product_name: "Chocolate cookies".to_owned(),
            price: Decimal::new(170, 0),
            category: Some("Bakery".to_owned()),
        },
        CatalogProduct {
            variant_id: VariantId::from("v3"),
            product_name: "Milk".to_owned(),
            price: Decimal::new(30, 0),
            category: Some("Dairy".to_owned()),
        },
    ])
}

/// In-memory cart storage whose saves and deletes can be switched off.
#[derive(Default)]
pub struct FlakyCartRepository {
    inner: InMemoryCartRepository,
    failing_writes: AtomicBool,
    failing_deletes: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyCartRepository {
    pub fn fail_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, failing: bool) {
        self.failing_deletes.store(failing, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn insert_raw(&self, user_id: &UserId, document: &str) {
        self.inner.insert_raw(user_id, document).await;
    }
}

#[async_trait]
impl CartRepository for FlakyCartRepository {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Cart>, RepositoryError> {
        self.inner.find_by_user(user_id).await
    }

    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<i64, RepositoryError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(user_id, cart).await
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.delete(user_id).await
    }
}

/// Conversation storage that reads as empty and refuses every write.
#[derive(Default)]
pub struct ReadOnlyConversationRepository;

#[async_trait]
impl ConversationRepository for ReadOnlyConversationRepository {
    async fn find_by_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<ConversationLog>, RepositoryError> {
        Ok(None)
    }

    async fn save(&self, _user_id: &UserId, _log: &ConversationLog) -> Result<i64, RepositoryError> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn delete(&self, _user_id: &UserId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }
}
