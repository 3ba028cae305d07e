use chrono::Utc;
use sqlx::Row;

use cartkeeper_core::{ConversationLog, UserId};

use super::{decode_document, encode_document, ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ConversationLog>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM conversation_record WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String =
                    row.try_get("document").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(decode_document(user_id, &document)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, user_id: &UserId, log: &ConversationLog) -> Result<i64, RepositoryError> {
        let document = encode_document(log)?;

        let row = sqlx::query(
            "INSERT INTO conversation_record (user_id, document, version, updated_at)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 document = excluded.document,
                 version = conversation_record.version + 1,
                 updated_at = excluded.updated_at
             RETURNING version",
        )
        .bind(user_id.as_str())
        .bind(&document)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        row.try_get::<i64, _>("version").map_err(|e| RepositoryError::Decode(e.to_string()))
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM conversation_record WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
