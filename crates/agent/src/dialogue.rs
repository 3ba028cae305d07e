use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cartkeeper_core::{
    Catalog, CatalogProduct, DomainError, FlowState, ProductInfo, UserId, VariantId,
};

use crate::cart_store::CartAction;
use crate::endpoint::EndpointError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOp {
    Add,
    Remove,
    Update,
    View,
    Clear,
}

/// Cart instruction as routed by the dialogue layer. Fields are optional on
/// the wire and checked when the command becomes a [`CartAction`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCommand {
    pub op: CartOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_info: Option<ProductInfo>,
}

impl CartCommand {
    pub fn new(op: CartOp) -> Self {
        Self { op, variant_id: None, quantity: None, product_info: None }
    }

    pub fn add(variant_id: impl Into<VariantId>, quantity: i64) -> Self {
        Self {
            variant_id: Some(variant_id.into()),
            quantity: Some(quantity),
            ..Self::new(CartOp::Add)
        }
    }

    pub fn remove(variant_id: impl Into<VariantId>) -> Self {
        Self { variant_id: Some(variant_id.into()), ..Self::new(CartOp::Remove) }
    }

    pub fn update(variant_id: impl Into<VariantId>, quantity: i64) -> Self {
        Self {
            variant_id: Some(variant_id.into()),
            quantity: Some(quantity),
            ..Self::new(CartOp::Update)
        }
    }

    pub fn with_product_info(mut self, product_info: ProductInfo) -> Self {
        self.product_info = Some(product_info);
        self
    }

    /// Builds the cart action. `catalog_product`, when known, replaces any
    /// product details supplied with the command. A missing add quantity means one.
    pub fn into_action(
        self,
        catalog_product: Option<ProductInfo>,
    ) -> Result<CartAction, DomainError> {
        match self.op {
            CartOp::Add => {
                let variant_id = required_variant(self.variant_id)?;
                let product = catalog_product.or(self.product_info).ok_or_else(|| {
                    DomainError::validation("product_info with name and price is required")
                })?;
                Ok(CartAction::Add { variant_id, quantity: self.quantity.unwrap_or(1), product })
            }
            CartOp::Remove => {
                Ok(CartAction::Remove { variant_id: required_variant(self.variant_id)? })
            }
            CartOp::Update => {
                let variant_id = required_variant(self.variant_id)?;
                let quantity = self
                    .quantity
                    .ok_or_else(|| DomainError::validation("quantity is required for update"))?;
                Ok(CartAction::SetQuantity { variant_id, quantity })
            }
            CartOp::View => Ok(CartAction::View),
            CartOp::Clear => Ok(CartAction::Clear),
        }
    }
}

fn required_variant(variant_id: Option<VariantId>) -> Result<VariantId, DomainError> {
    variant_id
        .filter(|id| !id.as_str().trim().is_empty())
        .ok_or_else(|| DomainError::validation("variant_id is required"))
}

/// Fixed action contract between the dialogue layer and the session coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoutedAction {
    Browse,
    Cart(CartCommand),
    Checkout,
    Confirm,
    Decline,
    /// Plain conversation; nothing to execute.
    Respond,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueRequest {
    pub user_id: UserId,
    pub user_input: String,
    pub memory_context: String,
    pub state: FlowState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueReply {
    pub action: RoutedAction,
    pub response: String,
}

#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn route(&self, request: &DialogueRequest) -> Result<DialogueReply, EndpointError>;
}

/// Deterministic keyword router over a known catalog.
#[derive(Clone, Debug, Default)]
pub struct KeywordDialogue {
    catalog: Catalog,
}

impl KeywordDialogue {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn interpret(&self, text: &str, state: FlowState) -> DialogueReply {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);

        if state == FlowState::AwaitingConfirmation && is_affirmative(&tokens) {
            return reply(RoutedAction::Confirm, "Placing your order now.");
        }

        if contains_any(&normalized, &["checkout", "check out", "place order", "place my order"]) {
            return reply(RoutedAction::Checkout, "Here is your order summary. Shall I place it?");
        }
        if contains_any(&normalized, &["clear my cart", "clear the cart", "clear cart", "empty my"]) {
            return reply(RoutedAction::Cart(CartCommand::new(CartOp::Clear)), "Clearing your cart.");
        }

        let product = self.match_product(&normalized, &tokens);
        let quantity = extract_quantity(&tokens);

        if let Some(product) = product {
            let variant_id = product.variant_id.clone();
            if has_any_token(&tokens, &["remove", "delete", "drop"]) {
                return reply(
                    RoutedAction::Cart(CartCommand::remove(variant_id)),
                    "Removing that from your cart.",
                );
            }
            if has_any_token(&tokens, &["change", "set", "update", "make"]) {
                if let Some(quantity) = quantity {
                    return reply(
                        RoutedAction::Cart(CartCommand::update(variant_id, quantity)),
                        "Updating the quantity.",
                    );
                }
            }
            return reply(
                RoutedAction::Cart(
                    CartCommand::add(variant_id, quantity.unwrap_or(1))
                        .with_product_info(product.product_info()),
                ),
                "Adding that to your cart.",
            );
        }

        if contains_any(&normalized, &["my cart", "view cart", "show cart", "in my cart"]) {
            return reply(RoutedAction::Cart(CartCommand::new(CartOp::View)), "Here is your cart.");
        }
        if state == FlowState::AwaitingConfirmation && is_negative(&tokens) {
            return reply(RoutedAction::Decline, "No problem, I have not placed the order.");
        }
        if contains_any(&normalized, &["browse", "menu", "catalog", "products", "what do you have"]) {
            return reply(RoutedAction::Browse, "Here is what we have today.");
        }

        reply(
            RoutedAction::Respond,
            "I can show the catalog, manage your cart, or check out. What would you like?",
        )
    }

    /// Longest catalog name found in the text wins; an exact variant id token also matches.
    fn match_product(&self, normalized: &str, tokens: &[String]) -> Option<&CatalogProduct> {
        self.catalog
            .products()
            .iter()
            .filter(|product| {
                let name = normalize_text(&product.product_name);
                (!name.is_empty() && normalized.contains(&name))
                    || tokens.iter().any(|token| token.eq_ignore_ascii_case(product.variant_id.as_str()))
            })
            .max_by_key(|product| product.product_name.len())
    }
}

#[async_trait]
impl DialogueService for KeywordDialogue {
    async fn route(&self, request: &DialogueRequest) -> Result<DialogueReply, EndpointError> {
        Ok(self.interpret(&request.user_input, request.state))
    }
}

fn reply(action: RoutedAction, response: &str) -> DialogueReply {
    DialogueReply { action, response: response.to_owned() }
}

fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|character: char| !(character.is_alphanumeric() || matches!(character, '_' | '-')))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| text.contains(phrase))
}

fn has_any_token(tokens: &[String], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(&token.as_str()))
}

fn is_affirmative(tokens: &[String]) -> bool {
    has_any_token(tokens, &["yes", "yeah", "yep", "confirm", "confirmed", "sure", "ok", "okay"])
}

fn is_negative(tokens: &[String]) -> bool {
    has_any_token(tokens, &["no", "nope", "cancel", "wait", "stop"])
}

fn extract_quantity(tokens: &[String]) -> Option<i64> {
    tokens.iter().find_map(|token| match token.parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => word_number(token),
    })
}

fn word_number(token: &str) -> Option<i64> {
    let value = match token {
        "one" => 1,
        "two" | "couple" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => return None,
    };
    Some(value)
}
