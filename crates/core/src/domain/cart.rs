use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Display symbol attached to every summary.
pub const CURRENCY_SYMBOL: &str = "₹";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(UserId);
string_id!(CartId);
string_id!(VariantId);

/// Name and unit price of the product behind a variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    pub price: Decimal,
}

impl ProductInfo {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self { name: name.into(), price }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product_info.name is required"));
        }
        if self.price.is_sign_negative() {
            return Err(DomainError::validation("product_info.price must not be negative"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredCartLine", into = "StoredCartLine")]
pub struct CartLine {
    pub variant_id: VariantId,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Document shape of a line. `subtotal` is written for readers of the stored
/// record and ignored on the way back in.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredCartLine {
    variant_id: VariantId,
    product_name: String,
    price: Decimal,
    quantity: u32,
    #[serde(default, skip_deserializing)]
    subtotal: Decimal,
    added_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredCartLine> for CartLine {
    type Error = String;

    fn try_from(stored: StoredCartLine) -> Result<Self, Self::Error> {
        if stored.quantity == 0 {
            return Err(format!("cart line `{}` has zero quantity", stored.variant_id));
        }
        if stored.price.is_sign_negative() {
            return Err(format!("cart line `{}` has a negative price", stored.variant_id));
        }

        Ok(Self {
            variant_id: stored.variant_id,
            product_name: stored.product_name,
            unit_price: stored.price,
            quantity: stored.quantity,
            added_at: stored.added_at,
            updated_at: stored.updated_at,
        })
    }
}

impl From<CartLine> for StoredCartLine {
    fn from(line: CartLine) -> Self {
        let subtotal = line.subtotal();
        Self {
            variant_id: line.variant_id,
            product_name: line.product_name,
            price: line.unit_price,
            quantity: line.quantity,
            subtotal,
            added_at: line.added_at,
            updated_at: line.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub total_items: usize,
    pub total_quantity: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,
}

impl CartSummary {
    pub fn empty() -> Self {
        Self {
            total_items: 0,
            total_quantity: 0,
            total_amount: Decimal::ZERO,
            currency: CURRENCY_SYMBOL.to_owned(),
        }
    }
}

/// Result of a successful cart mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartMutation {
    pub action: String,
    pub summary: CartSummary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub items: Vec<CartLine>,
    pub summary: CartSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub cart_id: CartId,
    #[serde(default)]
    items: Vec<CartLine>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Set when the remote cart allocation failed and this cart only lives locally.
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub allocation_error: Option<String>,
}

impl Cart {
    pub fn new(cart_id: CartId) -> Self {
        let now = Utc::now();
        Self { cart_id, items: Vec::new(), created_at: now, updated_at: now, allocation_error: None }
    }

    pub fn degraded(error: impl Into<String>) -> Self {
        Self { allocation_error: Some(error.into()), ..Self::new(CartId::default()) }
    }

    pub fn has_usable_id(&self) -> bool {
        !self.cart_id.0.trim().is_empty()
    }

    pub fn adopt_cart_id(&mut self, cart_id: CartId) {
        self.cart_id = cart_id;
        self.allocation_error = None;
    }

    pub fn items(&self) -> &[CartLine] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn line(&self, variant_id: &VariantId) -> Option<&CartLine> {
        self.items.iter().find(|line| &line.variant_id == variant_id)
    }

    /// INCREMENT an existing line or ADD a new one.
    pub fn add_item(
        &mut self,
        variant_id: VariantId,
        quantity: i64,
        product: &ProductInfo,
    ) -> Result<CartMutation, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be a positive integer (got {quantity})"
            )));
        }
        let quantity = checked_quantity(quantity)?;
        product.validate()?;

        let now = self.next_timestamp();
        let action = match self.items.iter_mut().find(|line| line.variant_id == variant_id) {
            Some(line) => {
                line.quantity = line.quantity.checked_add(quantity).ok_or_else(|| {
                    DomainError::validation(format!(
                        "quantity for {} would exceed {}",
                        line.product_name,
                        u32::MAX
                    ))
                })?;
                line.updated_at = now;
                format!("Updated {} quantity to {}", line.product_name, line.quantity)
            }
            None => {
                self.items.push(CartLine {
                    variant_id,
                    product_name: product.name.trim().to_owned(),
                    unit_price: product.price,
                    quantity,
                    added_at: now,
                    updated_at: now,
                });
                format!("Added {quantity} {} to cart", product.name.trim())
            }
        };

        self.updated_at = now;
        Ok(self.mutation(action))
    }

    pub fn remove_item(&mut self, variant_id: &VariantId) -> Result<CartMutation, DomainError> {
        let position = self
            .items
            .iter()
            .position(|line| &line.variant_id == variant_id)
            .ok_or_else(|| DomainError::ItemNotFound { variant_id: variant_id.clone() })?;

        let removed = self.items.remove(position);
        self.updated_at = self.next_timestamp();
        Ok(self.mutation(format!("Removed {} from cart", removed.product_name)))
    }

    /// SET a line's quantity outright; zero or below removes the line.
    pub fn set_quantity(
        &mut self,
        variant_id: &VariantId,
        new_quantity: i64,
    ) -> Result<CartMutation, DomainError> {
        if new_quantity <= 0 {
            return self.remove_item(variant_id);
        }
        let new_quantity = checked_quantity(new_quantity)?;

        let now = self.next_timestamp();
        let line = self
            .items
            .iter_mut()
            .find(|line| &line.variant_id == variant_id)
            .ok_or_else(|| DomainError::ItemNotFound { variant_id: variant_id.clone() })?;

        let old_quantity = line.quantity;
        line.quantity = new_quantity;
        line.updated_at = now;
        let action = format!(
            "Updated {} quantity from {old_quantity} to {new_quantity}",
            line.product_name
        );

        self.updated_at = now;
        Ok(self.mutation(action))
    }

    pub fn clear(&mut self) -> CartMutation {
        let removed = self.items.len();
        self.items.clear();
        self.updated_at = self.next_timestamp();
        self.mutation(format!("Cleared cart ({removed} items removed)"))
    }

    pub fn summary(&self) -> CartSummary {
        if self.items.is_empty() {
            return CartSummary::empty();
        }

        CartSummary {
            total_items: self.items.len(),
            total_quantity: self.items.iter().map(|line| u64::from(line.quantity)).sum(),
            total_amount: self.items.iter().map(CartLine::subtotal).sum::<Decimal>().round_dp(2),
            currency: CURRENCY_SYMBOL.to_owned(),
        }
    }

    pub fn view(&self) -> CartView {
        CartView {
            cart_empty: self.items.is_empty(),
            message: self.items.is_empty().then(|| "Your cart is currently empty".to_owned()),
            items: self.items.clone(),
            summary: self.summary(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn mutation(&self, action: String) -> CartMutation {
        CartMutation { action, summary: self.summary() }
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        Utc::now().max(self.updated_at)
    }
}

fn checked_quantity(quantity: i64) -> Result<u32, DomainError> {
    u32::try_from(quantity)
        .map_err(|_| DomainError::validation(format!("quantity {quantity} is out of range")))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Cart, CartId, ProductInfo, VariantId, CURRENCY_SYMBOL};
    use crate::errors::DomainError;

    fn brown_bread() -> ProductInfo {
        ProductInfo::new("Brown bread", Decimal::new(45, 0))
    }

    fn cookies() -> ProductInfo {
        ProductInfo::new("Chocolate cookies", Decimal::new(170, 0))
    }

    fn cart() -> Cart {
        Cart::new(CartId::from("cart_01"))
    }

    #[test]
    fn add_then_set_quantity_matches_checkout_scenario() {
        let mut cart = cart();

        let added = cart.add_item(VariantId::from("v1"), 2, &brown_bread()).expect("add v1");
        assert_eq!(added.action, "Added 2 Brown bread to cart");
        let line = cart.line(&VariantId::from("v1")).expect("line exists");
        assert_eq!(line.quantity, 2);
        assert_eq!(line.subtotal(), Decimal::new(90, 0));
        assert_eq!(added.summary.total_items, 1);
        assert_eq!(added.summary.total_quantity, 2);
        assert_eq!(added.summary.total_amount, Decimal::new(90, 0));

        let updated = cart.set_quantity(&VariantId::from("v1"), 5).expect("set v1");
        assert_eq!(updated.action, "Updated Brown bread quantity from 2 to 5");
        let line = cart.line(&VariantId::from("v1")).expect("line exists");
        assert_eq!(line.quantity, 5);
        assert_eq!(line.subtotal(), Decimal::new(225, 0));
        assert_eq!(updated.summary.total_amount, Decimal::new(225, 0));
    }

    #[test]
    fn repeated_adds_increment_and_keep_subtotal_consistent() {
        let mut cart = cart();
        let mut expected = 0;

        for quantity in [1, 3, 2, 7] {
            expected += quantity;
            cart.add_item(VariantId::from("v1"), quantity, &brown_bread()).expect("add");
            let line = cart.line(&VariantId::from("v1")).expect("line exists");
            assert_eq!(i64::from(line.quantity), expected);
            assert_eq!(line.subtotal(), line.unit_price * Decimal::from(line.quantity));
        }

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.summary().total_amount, Decimal::new(45 * 13, 0));
    }

    #[test]
    fn non_positive_add_quantity_is_a_validation_error() {
        let mut cart = cart();
        let before = cart.clone();

        for quantity in [0, -3] {
            let error = cart
                .add_item(VariantId::from("v1"), quantity, &brown_bread())
                .expect_err("non-positive quantity must be rejected");
            assert!(matches!(error, DomainError::Validation(_)));
        }

        assert_eq!(cart, before);
    }

    #[test]
    fn missing_product_name_is_a_validation_error() {
        let mut cart = cart();
        let error = cart
            .add_item(VariantId::from("v1"), 1, &ProductInfo::new("  ", Decimal::ONE))
            .expect_err("blank name must be rejected");

        assert!(matches!(error, DomainError::Validation(ref message) if message.contains("name")));
        assert!(cart.is_empty());
    }

    #[test]
    fn set_quantity_zero_is_equivalent_to_remove() {
        let mut via_set = cart();
        via_set.add_item(VariantId::from("v1"), 2, &brown_bread()).expect("add v1");
        via_set.add_item(VariantId::from("v2"), 1, &cookies()).expect("add v2");
        let mut via_remove = via_set.clone();

        let set = via_set.set_quantity(&VariantId::from("v1"), 0).expect("set to zero");
        let removed = via_remove.remove_item(&VariantId::from("v1")).expect("remove");

        assert_eq!(set.action, removed.action);
        assert_eq!(set.summary, removed.summary);
        assert_eq!(via_set.items(), via_remove.items());
    }

    #[test]
    fn removing_a_missing_variant_leaves_cart_untouched() {
        let mut cart = cart();
        cart.add_item(VariantId::from("v1"), 2, &brown_bread()).expect("add v1");
        let before = cart.clone();

        let error = cart.remove_item(&VariantId::from("nope")).expect_err("missing variant");

        assert_eq!(error, DomainError::ItemNotFound { variant_id: VariantId::from("nope") });
        assert_eq!(cart.updated_at, before.updated_at);
        assert_eq!(cart.items(), before.items());
    }

    #[test]
    fn set_quantity_on_missing_variant_is_item_not_found() {
        let mut cart = cart();
        let error = cart.set_quantity(&VariantId::from("v9"), 4).expect_err("missing variant");
        assert!(matches!(error, DomainError::ItemNotFound { .. }));
    }

    #[test]
    fn clear_reports_removed_line_count() {
        let mut cart = cart();
        cart.add_item(VariantId::from("v1"), 2, &brown_bread()).expect("add v1");
        cart.add_item(VariantId::from("v2"), 1, &cookies()).expect("add v2");

        let cleared = cart.clear();

        assert_eq!(cleared.action, "Cleared cart (2 items removed)");
        assert!(cart.items().is_empty());
        assert_eq!(cleared.summary.total_items, 0);
        assert_eq!(cleared.summary.total_quantity, 0);
        assert_eq!(cleared.summary.total_amount, Decimal::ZERO);
    }

    #[test]
    fn view_distinguishes_empty_and_populated_carts() {
        let mut cart = cart();
        let empty = cart.view();
        assert!(empty.cart_empty);
        assert_eq!(empty.summary.total_items, 0);
        assert_eq!(empty.summary.total_amount, Decimal::ZERO);
        assert_eq!(empty.message.as_deref(), Some("Your cart is currently empty"));

        cart.add_item(VariantId::from("v1"), 1, &brown_bread()).expect("add v1");
        let populated = cart.view();
        assert!(!populated.cart_empty);
        assert!(populated.message.is_none());
        assert_eq!(populated.items.len(), 1);
        assert_eq!(populated.summary.currency, CURRENCY_SYMBOL);
    }

    #[test]
    fn lines_keep_insertion_order() {
        let mut cart = cart();
        cart.add_item(VariantId::from("v2"), 1, &cookies()).expect("add v2");
        cart.add_item(VariantId::from("v1"), 1, &brown_bread()).expect("add v1");
        cart.add_item(VariantId::from("v2"), 1, &cookies()).expect("increment v2");

        let order: Vec<&str> = cart.items().iter().map(|line| line.variant_id.as_str()).collect();
        assert_eq!(order, vec!["v2", "v1"]);
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut cart = cart();
        let mut previous = cart.updated_at;

        cart.add_item(VariantId::from("v1"), 1, &brown_bread()).expect("add");
        assert!(cart.updated_at >= previous);
        previous = cart.updated_at;
        cart.set_quantity(&VariantId::from("v1"), 3).expect("set");
        assert!(cart.updated_at >= previous);
        previous = cart.updated_at;
        cart.clear();
        assert!(cart.updated_at >= previous);
    }

    #[test]
    fn total_amount_is_rounded_to_two_places() {
        let mut cart = cart();
        cart.add_item(VariantId::from("v1"), 3, &ProductInfo::new("Bun", Decimal::new(3333, 3)))
            .expect("add");

        assert_eq!(cart.summary().total_amount, Decimal::new(1000, 2));
    }

    #[test]
    fn document_round_trip_preserves_lines_and_timestamps() {
        let mut cart = cart();
        cart.add_item(VariantId::from("v1"), 2, &brown_bread()).expect("add v1");
        cart.add_item(VariantId::from("v2"), 1, &cookies()).expect("add v2");

        let document = serde_json::to_string(&cart).expect("serialize");
        let restored: Cart = serde_json::from_str(&document).expect("deserialize");

        assert_eq!(restored, cart);
        assert_eq!(restored.summary(), cart.summary());
    }

    #[test]
    fn stored_subtotal_is_recomputed_not_trusted() {
        let document = r#"{
            "cart_id": "cart_01",
            "items": [{
                "variant_id": "v1",
                "product_name": "Brown bread",
                "price": "45",
                "quantity": 2,
                "subtotal": "9999",
                "added_at": "2026-01-05T10:00:00Z",
                "updated_at": "2026-01-05T10:00:00Z"
            }],
            "created_at": "2026-01-05T10:00:00Z",
            "updated_at": "2026-01-05T10:00:00Z"
        }"#;

        let cart: Cart = serde_json::from_str(document).expect("deserialize");
        assert_eq!(cart.items()[0].subtotal(), Decimal::new(90, 0));
    }

    #[test]
    fn documents_without_cart_id_are_rejected() {
        let result = serde_json::from_str::<Cart>(r#"{"items": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn degraded_cart_has_no_usable_id_until_adopted() {
        let mut cart = Cart::degraded("connection refused");
        assert!(!cart.has_usable_id());
        assert_eq!(cart.allocation_error.as_deref(), Some("connection refused"));

        cart.adopt_cart_id(CartId::from("cart_02"));
        assert!(cart.has_usable_id());
        assert!(cart.allocation_error.is_none());
    }
}
