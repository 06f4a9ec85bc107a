//! Payment persistence and status transitions.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, is_unique_violation};
use crate::models::payment::{Payment, PaymentStatus};

/// Insert a payment inside an open transaction. The unique index on
/// `idempotency_key` turns a duplicate submission into
/// `DuplicateIdempotencyKey` so the caller can replay or reject.
pub async fn create(conn: &mut PgConnection, payment: &Payment) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, idempotency_key, type, status, source_account_id,
            dest_account_id, dest_iban, dest_bank_name,
            source_amount, source_currency, dest_amount, dest_currency,
            exchange_rate, fee_amount, fee_currency,
            provider_ref, failure_reason, metadata,
            created_at, updated_at, completed_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
        )
        "#,
    )
    .bind(payment.id)
    .bind(&payment.idempotency_key)
    .bind(payment.payment_type)
    .bind(payment.status)
    .bind(payment.source_account_id)
    .bind(payment.dest_account_id)
    .bind(&payment.dest_iban)
    .bind(&payment.dest_bank_name)
    .bind(payment.source_amount)
    .bind(payment.source_currency)
    .bind(payment.dest_amount)
    .bind(payment.dest_currency)
    .bind(payment.exchange_rate)
    .bind(payment.fee_amount)
    .bind(payment.fee_currency)
    .bind(&payment.provider_ref)
    .bind(&payment.failure_reason)
    .bind(&payment.metadata)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .bind(payment.completed_at)
    .execute(&mut *conn)
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

pub async fn get_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Payment>, AppError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(payment)
}

pub async fn get_by_idempotency_key(
    pool: &DbPool,
    key: &str,
) -> Result<Option<Payment>, AppError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE idempotency_key = $1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(payment)
}

/// Transition a payment's status. `provider_ref` is only ever added, never
/// cleared, hence the COALESCE.
pub async fn update_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: PaymentStatus,
    provider_ref: Option<&str>,
    failure_reason: Option<&str>,
    completed_at: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET status = $1,
            provider_ref = COALESCE($2, provider_ref),
            failure_reason = $3,
            completed_at = $4,
            updated_at = now()
        WHERE id = $5
        "#,
    )
    .bind(status)
    .bind(provider_ref)
    .bind(failure_reason)
    .bind(completed_at)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}
