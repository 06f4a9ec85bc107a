//! Ledger entry model.
//!
//! Entries are append-only: no update or delete path exists anywhere in the
//! codebase. Each entry snapshots the account balance before and after it was
//! applied, so the per-account entry chain can be replayed independently of
//! row timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::account::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub account_id: Uuid,
    pub entry_type: EntryType,

    /// Always positive; direction is carried by `entry_type`.
    pub amount: i64,
    pub currency: Currency,

    pub balance_before: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}
