//! User model.
//!
//! Users own wallets and are addressable as transfer recipients by their
//! `unique_name` handle. The reserved system user owns the fx_pool and
//! outgoing accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The reserved owner of all system accounts.
pub const SYSTEM_USER_ID: Uuid = Uuid::from_u128(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,

    /// Human-chosen handle used to address this user as a recipient.
    pub unique_name: Option<String>,

    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}
