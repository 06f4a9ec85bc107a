//! Error types and HTTP error response handling.
//!
//! One taxonomy spans the whole service. Every variant carries a stable
//! machine-readable code and maps to a canonical HTTP status; the
//! `IntoResponse` impl renders the failure envelope so handlers can return
//! `Result<T, AppError>` directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::response::{self, FieldError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed. Wraps any sqlx::Error that was not mapped
    /// to a domain error at the store layer. Details are hidden from clients.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // -- authorization -------------------------------------------------------
    #[error("authorization header required")]
    MissingToken,

    #[error("token is invalid or expired")]
    InvalidToken,

    #[error("webhook signature is invalid")]
    InvalidSignature,

    // -- request shape -------------------------------------------------------
    #[error("invalid request body")]
    InvalidRequest,

    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("invalid currency")]
    InvalidCurrency,

    #[error("Idempotency-Key header is required")]
    MissingIdempotencyKey,

    // -- not found -----------------------------------------------------------
    #[error("resource not found")]
    NotFound,

    // -- business rules ------------------------------------------------------
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("account is frozen")]
    AccountFrozen,

    #[error("account is closed")]
    AccountClosed,

    #[error("cannot transfer to the same account")]
    SelfTransfer,

    #[error("transaction limit exceeded")]
    LimitExceeded,

    #[error("recipient not found")]
    RecipientNotFound,

    #[error("account not found")]
    AccountNotFound,

    // -- conflicts -----------------------------------------------------------
    #[error("duplicate payment")]
    DuplicatePayment,

    /// Unique-index violation on `payments.idempotency_key`. Internal: the
    /// executors either replay the stored payment or surface
    /// `DuplicatePayment`; it shares that code if it ever escapes.
    #[error("duplicate idempotency key")]
    DuplicateIdempotencyKey,

    #[error("account already exists for this currency")]
    AccountExists,

    #[error("idempotency key already used with a different request")]
    IdempotencyConflict,

    #[error("resource was modified concurrently, please retry")]
    VersionConflict,
}

impl AppError {
    /// Stable machine-readable code surfaced in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "INTERNAL_ERROR",
            AppError::MissingToken => "MISSING_TOKEN",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::InvalidRequest => "INVALID_REQUEST",
            AppError::ValidationFailed(_) => "VALIDATION_FAILED",
            AppError::InvalidAmount => "INVALID_AMOUNT",
            AppError::InvalidCurrency => "INVALID_CURRENCY",
            AppError::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            AppError::NotFound => "RESOURCE_NOT_FOUND",
            AppError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AppError::AccountFrozen => "ACCOUNT_FROZEN",
            AppError::AccountClosed => "ACCOUNT_CLOSED",
            AppError::SelfTransfer => "SELF_TRANSFER_NOT_ALLOWED",
            AppError::LimitExceeded => "TRANSACTION_LIMIT_EXCEEDED",
            AppError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            AppError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            AppError::DuplicatePayment | AppError::DuplicateIdempotencyKey => "DUPLICATE_PAYMENT",
            AppError::AccountExists => "ACCOUNT_ALREADY_EXISTS",
            AppError::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            AppError::VersionConflict => "VERSION_CONFLICT",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingToken | AppError::InvalidToken | AppError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            AppError::InvalidRequest
            | AppError::ValidationFailed(_)
            | AppError::InvalidAmount
            | AppError::InvalidCurrency
            | AppError::MissingIdempotencyKey => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InsufficientFunds
            | AppError::AccountFrozen
            | AppError::AccountClosed
            | AppError::SelfTransfer
            | AppError::LimitExceeded
            | AppError::RecipientNotFound
            | AppError::AccountNotFound => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicatePayment
            | AppError::DuplicateIdempotencyKey
            | AppError::AccountExists
            | AppError::IdempotencyConflict
            | AppError::VersionConflict => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Hide internals from clients; everything else is safe to echo.
        let message = match &self {
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let details = match self {
            AppError::ValidationFailed(fields) => serde_json::to_value(fields).ok(),
            _ => None,
        };

        response::failure(status, code, &message, details)
    }
}

/// True when the error is a Postgres unique-index violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// True when the error is a Postgres check-constraint violation
/// (SQLSTATE 23514); on `accounts.balance` this is a would-be overdraft.
pub fn is_check_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23514"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_are_stable() {
        let cases = [
            (AppError::MissingToken, "MISSING_TOKEN", 401),
            (AppError::InvalidSignature, "INVALID_SIGNATURE", 401),
            (AppError::InvalidAmount, "INVALID_AMOUNT", 400),
            (AppError::InvalidCurrency, "INVALID_CURRENCY", 400),
            (
                AppError::MissingIdempotencyKey,
                "MISSING_IDEMPOTENCY_KEY",
                400,
            ),
            (AppError::NotFound, "RESOURCE_NOT_FOUND", 404),
            (AppError::InsufficientFunds, "INSUFFICIENT_FUNDS", 422),
            (AppError::AccountFrozen, "ACCOUNT_FROZEN", 422),
            (AppError::AccountClosed, "ACCOUNT_CLOSED", 422),
            (AppError::SelfTransfer, "SELF_TRANSFER_NOT_ALLOWED", 422),
            (AppError::LimitExceeded, "TRANSACTION_LIMIT_EXCEEDED", 422),
            (AppError::RecipientNotFound, "RECIPIENT_NOT_FOUND", 422),
            (AppError::AccountNotFound, "ACCOUNT_NOT_FOUND", 422),
            (AppError::DuplicatePayment, "DUPLICATE_PAYMENT", 409),
            (AppError::DuplicateIdempotencyKey, "DUPLICATE_PAYMENT", 409),
            (AppError::AccountExists, "ACCOUNT_ALREADY_EXISTS", 409),
            (AppError::IdempotencyConflict, "IDEMPOTENCY_CONFLICT", 409),
            (AppError::VersionConflict, "VERSION_CONFLICT", 409),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status().as_u16(), status);
        }
    }

    #[test]
    fn validation_failure_carries_field_details() {
        let err = AppError::ValidationFailed(vec![FieldError::new("amount", "must be greater than 0")]);
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
