//! Account persistence: reads, row locks, and guarded balance updates.

use std::collections::HashMap;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, is_check_violation, is_unique_violation};
use crate::models::account::{Account, AccountType, Currency};

pub async fn get_by_id(pool: &DbPool, id: Uuid) -> Result<Option<Account>, AppError> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

pub async fn get_by_user_and_currency(
    pool: &DbPool,
    user_id: Uuid,
    currency: Currency,
    account_type: AccountType,
) -> Result<Option<Account>, AppError> {
    let account = sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE user_id = $1 AND currency = $2 AND account_type = $3",
    )
    .bind(user_id)
    .bind(currency)
    .bind(account_type)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

pub async fn get_user_accounts(
    pool: &DbPool,
    user_id: Uuid,
    account_type: AccountType,
) -> Result<Vec<Account>, AppError> {
    let accounts = sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE user_id = $1 AND account_type = $2 ORDER BY created_at",
    )
    .bind(user_id)
    .bind(account_type)
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

/// Insert a new account. The unique `(user_id, currency, account_type)` index
/// turns a duplicate wallet into `AccountExists`.
pub async fn create(pool: &DbPool, account: &Account) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (
            id, user_id, currency, account_type, balance, version,
            account_number, iban, status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(account.id)
    .bind(account.user_id)
    .bind(account.currency)
    .bind(account.account_type)
    .bind(account.balance)
    .bind(account.version)
    .bind(&account.account_number)
    .bind(&account.iban)
    .bind(account.status)
    .bind(account.created_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::AccountExists
        } else {
            AppError::Database(e)
        }
    })?;
    Ok(())
}

/// Fetch one of the six system accounts. These are provisioned by migration;
/// a miss means the database was never seeded.
pub async fn get_system_account(
    pool: &DbPool,
    account_type: AccountType,
    currency: Currency,
) -> Result<Account, AppError> {
    get_by_user_and_currency(pool, crate::models::user::SYSTEM_USER_ID, currency, account_type)
        .await?
        .ok_or(AppError::NotFound)
}

/// Acquire a row-level exclusive lock on the account for the duration of the
/// surrounding transaction.
pub async fn get_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Account, AppError> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound)
}

/// Lock a set of accounts in a deterministic total order (ascending id) so
/// concurrent multi-account units of work can never deadlock each other.
pub async fn lock_in_order(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Account>, AppError> {
    let mut sorted = ids.to_vec();
    sorted.sort();

    let mut locked = HashMap::with_capacity(sorted.len());
    for id in sorted {
        let account = get_for_update(conn, id).await?;
        locked.insert(id, account);
    }
    Ok(locked)
}

/// Conditional balance update: the CAS on `version = new_version - 1` catches
/// lost updates, and the `balance >= 0` check constraint turns a would-be
/// overdraft into `InsufficientFunds`.
pub async fn update_balance(
    conn: &mut PgConnection,
    id: Uuid,
    new_balance: i64,
    new_version: i64,
) -> Result<(), AppError> {
    let result =
        sqlx::query("UPDATE accounts SET balance = $1, version = $2 WHERE id = $3 AND version = $4")
            .bind(new_balance)
            .bind(new_version)
            .bind(id)
            .bind(new_version - 1)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if is_check_violation(&e) {
                    AppError::InsufficientFunds
                } else {
                    AppError::Database(e)
                }
            })?;

    if result.rows_affected() == 0 {
        return Err(AppError::VersionConflict);
    }
    Ok(())
}
