//! Idempotency cache persistence.
//!
//! Keyed by `(idempotency_key, user_id)` so accidentally reused keys never
//! collide across tenants. Rows expire by timestamp; the lookup filters on
//! `expires_at` rather than relying on a janitor.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyEntry {
    pub idempotency_key: String,
    pub user_id: Uuid,

    /// Hex SHA-256 of (method, path, body); a different hash under the same
    /// key is a client bug and is rejected as a conflict.
    pub request_hash: String,

    pub status_code: i32,
    pub response_body: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn get(
    pool: &DbPool,
    key: &str,
    user_id: Uuid,
) -> Result<Option<IdempotencyEntry>, AppError> {
    let entry = sqlx::query_as::<_, IdempotencyEntry>(
        r#"
        SELECT * FROM idempotency_cache
        WHERE idempotency_key = $1 AND user_id = $2 AND expires_at > now()
        "#,
    )
    .bind(key)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(entry)
}

/// First writer wins: two parallel first attempts cannot both insert, and the
/// loser simply keeps its own freshly computed response.
pub async fn insert(pool: &DbPool, entry: &IdempotencyEntry) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO idempotency_cache (
            idempotency_key, user_id, request_hash, status_code, response_body,
            created_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (idempotency_key, user_id) DO NOTHING
        "#,
    )
    .bind(&entry.idempotency_key)
    .bind(entry.user_id)
    .bind(&entry.request_hash)
    .bind(entry.status_code)
    .bind(&entry.response_body)
    .bind(entry.created_at)
    .bind(entry.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}
