//! Payment lifecycle event persistence. Insert-only audit trail.

use sqlx::PgConnection;

use crate::error::AppError;
use crate::models::payment::PaymentEvent;

pub async fn create(conn: &mut PgConnection, event: &PaymentEvent) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO payment_events (id, payment_id, event_type, actor, payload, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id)
    .bind(event.payment_id)
    .bind(event.event_type)
    .bind(&event.actor)
    .bind(&event.payload)
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
