//! HTTP request handlers.
//!
//! Handlers validate the request shape, call into the services, and wrap the
//! result in the response envelope. Business decisions live in the services.

/// Wallet creation and listing
pub mod accounts;
/// FX rate quotes
pub mod fx;
/// Health check for monitoring
pub mod health;
/// Internal transfers, external payouts, payment lookup
pub mod payments;
/// Provider webhook intake
pub mod webhooks;
