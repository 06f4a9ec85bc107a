//! Wallet management HTTP handlers.
//!
//! This module implements the account-related API endpoints:
//! - POST /api/v1/accounts - Open a wallet in a given currency
//! - GET /api/v1/accounts - List the authenticated user's wallets

use axum::{
    Extension,
    extract::{Json, State, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::account::{
    Account, AccountResponse, AccountStatus, AccountType, CreateAccountRequest, Currency,
};
use crate::response::{self, FieldError};
use crate::state::AppState;
use crate::store::accounts;

/// Open a wallet in the given currency.
///
/// # Endpoint
///
/// `POST /api/v1/accounts`
///
/// # Request Body
///
/// ```json
/// {
///   "currency": "USD"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "id": "550e8400-...",
///     "user_id": "660e8400-...",
///     "currency": "USD",
///     "balance": 0,
///     "account_number": "0123456789",
///     "iban": "US82PAYS00000123456789",
///     "status": "active",
///     "created_at": "2025-06-01T12:00:00Z"
///   },
///   "error": null
/// }
/// ```
///
/// # Validation
///
/// - `currency` must be USD, EUR, or GBP
/// - One wallet per currency per user; a duplicate surfaces as
///   `ACCOUNT_ALREADY_EXISTS` from the unique index rather than a pre-check
pub async fn create_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|_| AppError::InvalidRequest)?;

    // Validate the currency code before touching the database
    let currency = match Currency::parse(&request.currency) {
        Some(currency) => currency,
        None => {
            return Err(AppError::ValidationFailed(vec![FieldError::new(
                "currency",
                "must be USD, EUR, or GBP",
            )]));
        }
    };

    // Assign bank-style identifiers at creation time
    let account_number = generate_account_number();
    let iban = generate_iban(currency, &account_number);

    let account = Account {
        id: Uuid::new_v4(),
        user_id: auth.user_id,
        currency,
        account_type: AccountType::User,
        balance: 0,
        version: 1,
        account_number: Some(account_number),
        iban: Some(iban),
        status: AccountStatus::Active,
        created_at: Utc::now(),
    };

    accounts::create(&state.pool, &account).await?;

    tracing::info!(
        account_id = %account.id,
        user_id = %auth.user_id,
        currency = %currency,
        "account created"
    );

    Ok(response::success(
        StatusCode::CREATED,
        AccountResponse::from(account),
    ))
}

/// List all wallets for the authenticated user.
///
/// # Endpoint
///
/// `GET /api/v1/accounts`
///
/// # Response
///
/// - **Success (200 OK)**: array of wallets (may be empty), oldest first
/// - **Error (401)**: missing or invalid token
///
/// # Security
///
/// Only `user`-kind accounts belonging to the authenticated user are
/// returned; system fx_pool and outgoing accounts are never exposed.
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Response, AppError> {
    let accounts = accounts::get_user_accounts(&state.pool, auth.user_id, AccountType::User).await?;

    // Convert each Account to its API representation
    let responses: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();
    Ok(response::success(StatusCode::OK, responses))
}

fn generate_account_number() -> String {
    let n: u64 = rand::thread_rng().gen_range(0..10_000_000_000);
    format!("{n:010}")
}

/// Deterministic IBAN-style identifier; not a real bank-issued IBAN, but
/// stable and unique per account number.
fn generate_iban(currency: Currency, account_number: &str) -> String {
    let prefix = match currency {
        Currency::Gbp => "GB",
        Currency::Eur => "DE",
        Currency::Usd => "US",
    };
    format!("{prefix}82PAYS0000{account_number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_are_ten_digits() {
        for _ in 0..100 {
            let n = generate_account_number();
            assert_eq!(n.len(), 10);
            assert!(n.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn iban_prefix_follows_currency() {
        assert!(generate_iban(Currency::Gbp, "0123456789").starts_with("GB"));
        assert!(generate_iban(Currency::Eur, "0123456789").starts_with("DE"));
        assert!(generate_iban(Currency::Usd, "0123456789").starts_with("US"));
        assert!(generate_iban(Currency::Usd, "0123456789").ends_with("0123456789"));
    }
}
