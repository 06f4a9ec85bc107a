//! Webhook event persistence: durable intake and the processor's work queue.

use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, is_unique_violation};
use crate::models::webhook::{WebhookEvent, WebhookEventStatus};

/// Persist an incoming provider callback. The unique index on the provider's
/// event id surfaces duplicate deliveries as `DuplicateIdempotencyKey`, which
/// intake treats as success.
pub async fn create(pool: &DbPool, event: &WebhookEvent) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO webhook_events (
            id, idempotency_key, event_type, payload, status, attempts, last_attempt, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(event.id)
    .bind(&event.idempotency_key)
    .bind(event.event_type)
    .bind(&event.payload)
    .bind(event.status)
    .bind(event.attempts)
    .bind(event.last_attempt)
    .bind(event.created_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateIdempotencyKey
        } else {
            AppError::Database(e)
        }
    })?;
    Ok(())
}

/// Claim up to `limit` pending events, oldest first. SKIP LOCKED keeps
/// concurrent processor instances from observing the same rows.
pub async fn claim_pending(pool: &DbPool, limit: i64) -> Result<Vec<WebhookEvent>, AppError> {
    let events = sqlx::query_as::<_, WebhookEvent>(
        r#"
        SELECT * FROM webhook_events
        WHERE status = $1
        ORDER BY created_at
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(WebhookEventStatus::Pending)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(events)
}

/// Move an event to `dispatched` or `failed`, recording the attempt.
pub async fn update_status(
    pool: &DbPool,
    id: Uuid,
    status: WebhookEventStatus,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE webhook_events SET status = $1, attempts = attempts + 1, last_attempt = now() WHERE id = $2",
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Record a failed processing attempt without leaving `pending`; the next
/// poll retries the event.
pub async fn mark_attempt(pool: &DbPool, id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE webhook_events SET attempts = attempts + 1, last_attempt = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
