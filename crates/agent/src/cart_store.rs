use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cartkeeper_core::{
    ApplicationError, Cart, CartId, CartMutation, CartView, DomainError, ProductInfo, UserId,
    VariantId,
};
use cartkeeper_db::CartRepository;

use crate::endpoint::{CartAllocator, EndpointError};

/// One cart operation. ADD increments, SET overwrites.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartAction {
    Add { variant_id: VariantId, quantity: i64, product: ProductInfo },
    Remove { variant_id: VariantId },
    SetQuantity { variant_id: VariantId, quantity: i64 },
    View,
    Clear,
}

/// Validation and not-found failures come back as `Rejected` with the cart untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartOutcome {
    Applied(CartMutation),
    Viewed(CartView),
    Rejected(DomainError),
}

/// Loads, mutates and persists a user's cart.
pub struct CartStore {
    repository: Arc<dyn CartRepository>,
    allocator: Arc<dyn CartAllocator>,
    allocation_timeout: Duration,
}

impl CartStore {
    pub fn new(
        repository: Arc<dyn CartRepository>,
        allocator: Arc<dyn CartAllocator>,
        allocation_timeout: Duration,
    ) -> Self {
        Self { repository, allocator, allocation_timeout }
    }

    /// Returns the stored cart, or allocates and persists a new one.
    ///
    /// A record that no longer decodes is treated like a missing one. Allocation
    /// failures yield a degraded cart instead of an error; storage failures do not.
    pub async fn load(&self, user_id: &UserId) -> Result<Cart, ApplicationError> {
        match self.repository.find_by_user(user_id).await {
            Ok(Some(mut cart)) => {
                if !cart.has_usable_id() {
                    self.ensure_allocated(user_id, &mut cart).await?;
                }
                return Ok(cart);
            }
            Ok(None) => {}
            Err(error) if error.is_decode() => {
                warn!(
                    event_name = "cart.record_discarded",
                    user_id = %user_id,
                    error = %error,
                    "stored cart is invalid; starting a new one"
                );
            }
            Err(error) => return Err(error.into()),
        }

        self.start_fresh(user_id).await
    }

    /// Allocates a brand new cart and persists it over whatever was stored.
    pub async fn start_fresh(&self, user_id: &UserId) -> Result<Cart, ApplicationError> {
        let cart = match self.allocate().await {
            Ok(cart_id) => Cart::new(cart_id),
            Err(error) => {
                warn!(
                    event_name = "cart.allocation_failed",
                    user_id = %user_id,
                    error = %error,
                    "continuing with a local cart"
                );
                Cart::degraded(error.to_string())
            }
        };
        self.repository.save(user_id, &cart).await?;
        info!(
            event_name = "cart.created",
            user_id = %user_id,
            cart_id = %cart.cart_id,
            degraded = !cart.has_usable_id(),
            "cart created"
        );
        Ok(cart)
    }

    /// Retries allocation for a cart without a remote id. Returns whether the
    /// cart now has one; lines are kept either way.
    pub async fn ensure_allocated(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
    ) -> Result<bool, ApplicationError> {
        if cart.has_usable_id() {
            return Ok(true);
        }

        match self.allocate().await {
            Ok(cart_id) => {
                let mut working = cart.clone();
                working.adopt_cart_id(cart_id);
                self.repository.save(user_id, &working).await?;
                info!(
                    event_name = "cart.allocated",
                    user_id = %user_id,
                    cart_id = %working.cart_id,
                    "late cart allocation succeeded"
                );
                *cart = working;
                Ok(true)
            }
            Err(error) => {
                warn!(
                    event_name = "cart.allocation_failed",
                    user_id = %user_id,
                    error = %error,
                    "cart still has no remote id"
                );
                cart.allocation_error = Some(error.to_string());
                Ok(false)
            }
        }
    }

    pub async fn apply(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
        action: CartAction,
    ) -> Result<CartOutcome, ApplicationError> {
        match action {
            CartAction::Add { variant_id, quantity, product } => {
                self.add_item(user_id, cart, variant_id, quantity, &product).await
            }
            CartAction::Remove { variant_id } => self.remove_item(user_id, cart, &variant_id).await,
            CartAction::SetQuantity { variant_id, quantity } => {
                self.set_quantity(user_id, cart, &variant_id, quantity).await
            }
            CartAction::View => Ok(CartOutcome::Viewed(Self::view(cart))),
            CartAction::Clear => self.clear(user_id, cart).await,
        }
    }

    pub async fn add_item(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
        variant_id: VariantId,
        quantity: i64,
        product: &ProductInfo,
    ) -> Result<CartOutcome, ApplicationError> {
        self.mutate(user_id, cart, |working| working.add_item(variant_id, quantity, product)).await
    }

    pub async fn remove_item(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
        variant_id: &VariantId,
    ) -> Result<CartOutcome, ApplicationError> {
        self.mutate(user_id, cart, |working| working.remove_item(variant_id)).await
    }

    pub async fn set_quantity(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
        variant_id: &VariantId,
        quantity: i64,
    ) -> Result<CartOutcome, ApplicationError> {
        self.mutate(user_id, cart, |working| working.set_quantity(variant_id, quantity)).await
    }

    pub async fn clear(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
    ) -> Result<CartOutcome, ApplicationError> {
        self.mutate(user_id, cart, |working| Ok(working.clear())).await
    }

    pub fn view(cart: &Cart) -> CartView {
        cart.view()
    }

    pub async fn discard(&self, user_id: &UserId) -> Result<bool, ApplicationError> {
        Ok(self.repository.delete(user_id).await?)
    }

    /// Applies `change` to a copy, persists the copy, then commits it to `cart`.
    async fn mutate<F>(
        &self,
        user_id: &UserId,
        cart: &mut Cart,
        change: F,
    ) -> Result<CartOutcome, ApplicationError>
    where
        F: FnOnce(&mut Cart) -> Result<CartMutation, DomainError>,
    {
        let mut working = cart.clone();
        let mutation = match change(&mut working) {
            Ok(mutation) => mutation,
            Err(error) => {
                debug!(
                    event_name = "cart.mutation_rejected",
                    user_id = %user_id,
                    error = %error,
                    "cart mutation rejected"
                );
                return Ok(CartOutcome::Rejected(error));
            }
        };

        let version = self.repository.save(user_id, &working).await?;
        *cart = working;
        info!(
            event_name = "cart.mutation_applied",
            user_id = %user_id,
            cart_id = %cart.cart_id,
            version,
            action = %mutation.action,
            "cart updated"
        );
        Ok(CartOutcome::Applied(mutation))
    }

    async fn allocate(&self) -> Result<CartId, EndpointError> {
        let after_ms = u64::try_from(self.allocation_timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(self.allocation_timeout, self.allocator.allocate())
            .await
            .unwrap_or(Err(EndpointError::Timeout { after_ms }))
    }
}
