use std::collections::HashMap;

use tokio::sync::RwLock;

use cartkeeper_core::{Cart, ConversationLog, UserId};

use super::{
    decode_document, encode_document, CartRepository, ConversationRepository, RepositoryError,
};

/// Documents are kept serialized so reads go through the same decode path as SQLite.
#[derive(Default)]
struct DocumentMap {
    records: RwLock<HashMap<String, (i64, String)>>,
}

impl DocumentMap {
    async fn get(&self, user_id: &UserId) -> Option<String> {
        let records = self.records.read().await;
        records.get(user_id.as_str()).map(|(_, document)| document.clone())
    }

    async fn put(&self, user_id: &UserId, document: String) -> i64 {
        let mut records = self.records.write().await;
        let entry = records.entry(user_id.as_str().to_owned()).or_insert((0, String::new()));
        entry.0 += 1;
        entry.1 = document;
        entry.0
    }

    async fn remove(&self, user_id: &UserId) -> bool {
        let mut records = self.records.write().await;
        records.remove(user_id.as_str()).is_some()
    }
}

#[derive(Default)]
pub struct InMemoryCartRepository {
    documents: DocumentMap,
}

impl InMemoryCartRepository {
    /// Stores a raw document as-is, bypassing encoding.
    pub async fn insert_raw(&self, user_id: &UserId, document: impl Into<String>) {
        self.documents.put(user_id, document.into()).await;
    }
}

#[async_trait::async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Cart>, RepositoryError> {
        match self.documents.get(user_id).await {
            Some(document) => Ok(Some(decode_document(user_id, &document)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<i64, RepositoryError> {
        let document = encode_document(cart)?;
        Ok(self.documents.put(user_id, document).await)
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        Ok(self.documents.remove(user_id).await)
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    documents: DocumentMap,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationLog>, RepositoryError> {
        match self.documents.get(user_id).await {
            Some(document) => Ok(Some(decode_document(user_id, &document)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &UserId, log: &ConversationLog) -> Result<i64, RepositoryError> {
        let document = encode_document(log)?;
        Ok(self.documents.put(user_id, document).await)
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        Ok(self.documents.remove(user_id).await)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use cartkeeper_core::{Cart, CartId, ConversationLog, ProductInfo, UserId, VariantId};

    use crate::repositories::{
        CartRepository, ConversationRepository, InMemoryCartRepository,
        InMemoryConversationRepository, RepositoryError,
    };

    #[tokio::test]
    async fn in_memory_cart_repo_round_trip() {
        let repo = InMemoryCartRepository::default();
        let user = UserId::from("alice");
        let mut cart = Cart::new(CartId::from("cart_01"));
        cart.add_item(VariantId::from("v1"), 3, &ProductInfo::new("Milk", Decimal::new(30, 0)))
            .expect("add");

        assert_eq!(repo.save(&user, &cart).await.expect("save"), 1);
        assert_eq!(repo.save(&user, &cart).await.expect("save again"), 2);
        let found = repo.find_by_user(&user).await.expect("find");

        assert_eq!(found, Some(cart));
    }

    #[tokio::test]
    async fn in_memory_cart_repo_reports_malformed_documents() {
        let repo = InMemoryCartRepository::default();
        let user = UserId::from("mallory");
        repo.insert_raw(&user, "not json").await;

        let error = repo.find_by_user(&user).await.expect_err("malformed");
        assert!(matches!(error, RepositoryError::Decode(_)));
    }

    #[tokio::test]
    async fn in_memory_conversation_repo_round_trip() {
        let repo = InMemoryConversationRepository::default();
        let user = UserId::from("bob");
        let mut log = ConversationLog::new();
        log.append("hi", "hello");

        repo.save(&user, &log).await.expect("save");
        assert_eq!(repo.find_by_user(&user).await.expect("find"), Some(log));
        assert!(repo.delete(&user).await.expect("delete"));
        assert_eq!(repo.find_by_user(&user).await.expect("find"), None);
    }
}
