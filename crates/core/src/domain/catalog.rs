use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::cart::{ProductInfo, VariantId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    #[serde(alias = "id")]
    pub variant_id: VariantId,
    #[serde(alias = "name", alias = "title")]
    pub product_name: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
}

impl CatalogProduct {
    pub fn product_info(&self) -> ProductInfo {
        ProductInfo::new(self.product_name.clone(), self.price)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog payload has no product list")]
    MissingProductList,
    #[error("catalog product is malformed: {0}")]
    MalformedProduct(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    products: Vec<CatalogProduct>,
}

impl Catalog {
    pub fn new(products: Vec<CatalogProduct>) -> Self {
        Self { products }
    }

    /// Accepts a bare product array, `{"data": [...]}`, or `[{"data": [...]}]`.
    pub fn from_payload(payload: Value) -> Result<Self, CatalogError> {
        let list = match payload {
            Value::Object(mut object) => match object.remove("data") {
                Some(Value::Array(items)) => items,
                _ => return Err(CatalogError::MissingProductList),
            },
            Value::Array(mut items) => {
                let wrapped = matches!(
                    items.as_slice(),
                    [Value::Object(object)] if matches!(object.get("data"), Some(Value::Array(_)))
                );
                if wrapped {
                    return Self::from_payload(items.remove(0));
                }
                items
            }
            _ => return Err(CatalogError::MissingProductList),
        };

        list.into_iter()
            .map(|item| {
                serde_json::from_value::<CatalogProduct>(item)
                    .map_err(|error| CatalogError::MalformedProduct(error.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn find(&self, variant_id: &VariantId) -> Option<&CatalogProduct> {
        self.products.iter().find(|product| &product.variant_id == variant_id)
    }

    pub fn products(&self) -> &[CatalogProduct] {
        &self.products
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> =
            self.products.iter().filter_map(|product| product.category.as_deref()).collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }
}
