//! Ledger entry persistence. Insert-only: the ledger is the immutable record
//! every balance is derived from.

use sqlx::PgConnection;

use crate::error::AppError;
use crate::models::ledger::LedgerEntry;

pub async fn create(conn: &mut PgConnection, entry: &LedgerEntry) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, payment_id, account_id, entry_type, amount, currency,
            balance_before, balance_after, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(entry.payment_id)
    .bind(entry.account_id)
    .bind(entry.entry_type)
    .bind(entry.amount)
    .bind(entry.currency)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
