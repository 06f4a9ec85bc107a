//! HTTP middleware components.
//!
//! Layered onto the authenticated API router: auth runs first and injects the
//! requesting user; the idempotency layer then deduplicates every mutating
//! request against its cache.

/// Bearer-token authentication
pub mod auth;
/// Per-user idempotency cache over mutating requests
pub mod idempotency;
