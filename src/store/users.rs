//! User lookups.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::user::User;

/// Resolve a transfer recipient by their handle.
pub async fn get_by_unique_name(pool: &DbPool, unique_name: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE unique_name = $1")
        .bind(unique_name)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}
