use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::cart::{Cart, CartId, CartSummary, VariantId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub variant_id: VariantId,
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

/// Self-contained description of a cart handed to the order endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub cart_id: CartId,
    pub items: Vec<OrderLine>,
    pub summary: CartSummary,
    pub cart_created_at: DateTime<Utc>,
    pub cart_updated_at: DateTime<Utc>,
}

impl OrderSnapshot {
    pub fn from_cart(cart: &Cart) -> Result<Self, DomainError> {
        if cart.is_empty() {
            return Err(DomainError::EmptyCart);
        }
        if !cart.has_usable_id() {
            return Err(DomainError::MissingCartId);
        }

        Ok(Self {
            cart_id: cart.cart_id.clone(),
            items: cart
                .items()
                .iter()
                .map(|line| OrderLine {
                    variant_id: line.variant_id.clone(),
                    product_name: line.product_name.clone(),
                    price: line.unit_price,
                    quantity: line.quantity,
                    subtotal: line.subtotal(),
                })
                .collect(),
            summary: cart.summary(),
            cart_created_at: cart.created_at,
            cart_updated_at: cart.updated_at,
        })
    }

    /// Hex SHA-256 of the serialized snapshot, stable for identical carts.
    pub fn idempotency_key(&self) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&payload)))
    }
}
