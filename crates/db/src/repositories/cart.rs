use chrono::Utc;
use sqlx::Row;

use cartkeeper_core::{Cart, UserId};

use super::{
    decode_document, encode_document, parse_timestamp, CartRepository, RecordMeta,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record_meta(&self, user_id: &UserId) -> Result<Option<RecordMeta>, RepositoryError> {
        let row = sqlx::query("SELECT version, updated_at FROM cart_record WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let version: i64 =
                    row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let updated_at: String = row
                    .try_get("updated_at")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                Ok(Some(RecordMeta { version, updated_at: parse_timestamp(&updated_at)? }))
            }
            None => Ok(None),
        }
    }

    pub async fn list_users(&self) -> Result<Vec<UserId>, RepositoryError> {
        let rows = sqlx::query("SELECT user_id FROM cart_record ORDER BY user_id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("user_id")
                    .map(UserId)
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CartRepository for SqlCartRepository {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM cart_record WHERE user_id = ?")
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

    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<i64, RepositoryError> {
        let document = encode_document(cart)?;

        let row = sqlx::query(
            "INSERT INTO cart_record (user_id, document, version, updated_at)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 document = excluded.document,
                 version = cart_record.version + 1,
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
        let result = sqlx::query("DELETE FROM cart_record WHERE user_id = ?")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
