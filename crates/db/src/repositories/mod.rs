use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Error as JsonError;
use thiserror::Error;

use cartkeeper_core::{ApplicationError, Cart, ConversationLog, UserId};

pub mod cart;
pub mod conversation;
pub mod memory;

pub use cart::SqlCartRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryCartRepository, InMemoryConversationRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The record exists but its document could not be read back.
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl RepositoryError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Storage(error.to_string())
    }
}

/// Metadata stored next to each record document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordMeta {
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Cart>, RepositoryError>;
    /// Upserts the cart and returns the new record version.
    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<i64, RepositoryError>;
    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationLog>, RepositoryError>;
    async fn save(&self, user_id: &UserId, log: &ConversationLog) -> Result<i64, RepositoryError>;
    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError>;
}

pub(crate) fn encode_document<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error: JsonError| RepositoryError::Encode(error.to_string()))
}

pub(crate) fn decode_document<T: serde::de::DeserializeOwned>(
    user_id: &UserId,
    document: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(document).map_err(|error| {
        RepositoryError::Decode(format!("record for user `{user_id}` is malformed: {error}"))
    })
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid updated_at `{value}`: {error}")))
}
