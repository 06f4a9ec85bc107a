//! Persistence layer.
//!
//! Free async functions over the pool (reads) or an open transaction
//! (multi-statement mutations). Row-miss handling stays here; translating a
//! miss into the right domain error is the caller's job. Constraint
//! violations that encode business meaning (duplicate idempotency key,
//! balance check) are mapped to domain errors at this boundary.

pub mod accounts;
pub mod idempotency;
pub mod ledger;
pub mod payment_events;
pub mod payments;
pub mod users;
pub mod webhook_events;
