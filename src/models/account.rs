//! Account data models and API request/response types.
//!
//! An account is a single-currency wallet. User wallets hold customer funds;
//! the system user owns one `fx_pool` and one `outgoing` account per currency
//! to absorb the contra-legs of conversions and in-flight payouts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported settlement currencies. All amounts are integers in the
/// currency's minor unit (cents, pence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    /// Parse a wire-format currency code. Returns `None` for anything
    /// outside the supported set so callers can report a field error
    /// instead of a deserialization failure.
    pub fn parse(s: &str) -> Option<Currency> {
        match s {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account kind. `user` wallets belong to customers; `fx_pool` and
/// `outgoing` are system-owned and never exposed through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountType {
    User,
    FxPool,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Frozen,
    Closed,
}

/// Account row.
///
/// `balance` is materialized from the ledger and guarded three ways: a row
/// lock before every read-modify-write, a version CAS on the update itself,
/// and a `CHECK (balance >= 0)` constraint as the final backstop.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub account_type: AccountType,

    /// Balance in minor units. Never negative.
    pub balance: i64,

    /// Bumped by exactly one on every balance mutation.
    pub version: i64,

    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/accounts`.
///
/// The currency arrives as a raw string and is validated explicitly so an
/// unsupported code produces a field-level error rather than a
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub currency: String,
}

/// Response body for account endpoints.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub balance: i64,
    pub account_number: Option<String>,
    pub iban: Option<String>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            currency: a.currency,
            balance: a.balance,
            account_number: a.account_number,
            iban: a.iban,
            status: a.status,
            created_at: a.created_at,
        }
    }
}
