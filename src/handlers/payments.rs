//! Payment HTTP handlers.
//!
//! This module implements the payment-related API endpoints:
//! - POST /api/v1/payments - Create an internal transfer
//! - POST /api/v1/payments/external - Create an external bank payout
//! - GET /api/v1/payments/:id - Get payment details
//!
//! Handlers validate the request shape, then hand off to the transfer and
//! payout executors; all balance movement happens there, inside a single
//! database transaction.

use axum::{
    Extension,
    extract::{Json, Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::account::Currency;
use crate::models::payment::{CreatePayoutRequest, CreateTransferRequest, PaymentResponse};
use crate::response;
use crate::services::payout::{self, PayoutRequest};
use crate::services::transfer::{self, TransferRequest};
use crate::state::AppState;

/// Create an internal transfer (synchronous).
///
/// # Endpoint
///
/// `POST /api/v1/payments`
///
/// # Request Body
///
/// ```json
/// {
///   "recipient_unique_name": "alice",
///   "source_currency": "USD",
///   "dest_currency": "EUR",
///   "amount": 10000
/// }
/// ```
///
/// # Response (201)
///
/// The payment settles inside the request; a `Location` header points at it.
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "id": "770e8400-...",
///     "type": "internal_transfer",
///     "status": "completed",
///     "source_amount": 10000,
///     "source_currency": "USD",
///     "dest_amount": 9154,
///     "dest_currency": "EUR",
///     "exchange_rate": "0.9154",
///     "fee_amount": 46,
///     "fee_currency": "EUR",
///     "created_at": "2025-06-01T12:00:00Z",
///     "completed_at": "2025-06-01T12:00:00Z"
///   },
///   "error": null
/// }
/// ```
///
/// # Validation
///
/// - Recipient handle, both currencies, and a positive amount are required
/// - Amount must not exceed the per-currency transaction limit
/// - Sender and recipient wallets must be active
///
/// # Atomicity
///
/// Both wallets (and, cross-currency, both FX pools) are locked and updated
/// in one database transaction. Either everything commits or nothing does.
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    body: Result<Json<CreateTransferRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    // Malformed JSON is a 400 in the standard envelope
    let Json(request) = body.map_err(|_| AppError::InvalidRequest)?;

    // Field-level validation before any lookups
    let fields = request.validate();
    if !fields.is_empty() {
        return Err(AppError::ValidationFailed(fields));
    }

    let idempotency_key = idempotency_key(&headers)?;
    let source_currency = parse_currency(&request.source_currency)?;
    let dest_currency = parse_currency(&request.dest_currency)?;

    // Execute the transfer; the sender is always the authenticated user
    let payment = transfer::create_internal_transfer(
        &state,
        TransferRequest {
            sender_user_id: auth.user_id,
            recipient_unique_name: request.recipient_unique_name,
            source_currency,
            dest_currency,
            amount: request.amount,
            idempotency_key,
        },
    )
    .await?;

    Ok(created(
        StatusCode::CREATED,
        payment.id,
        PaymentResponse::from(payment),
    ))
}

/// Create an external bank payout (asynchronous).
///
/// # Endpoint
///
/// `POST /api/v1/payments/external`
///
/// # Request Body
///
/// ```json
/// {
///   "source_currency": "USD",
///   "dest_currency": "USD",
///   "amount": 5000,
///   "dest_iban": "DE89370400440532013000",
///   "dest_bank_name": "Deutsche Bank"
/// }
/// ```
///
/// # Response (202)
///
/// The sender is debited immediately but the payment stays `pending` until
/// the provider confirms the outcome through a signed webhook.
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "id": "880e8400-...",
///     "type": "external_payout",
///     "status": "pending",
///     "source_amount": 5000,
///     "source_currency": "USD",
///     "dest_amount": 5000,
///     "dest_currency": "USD",
///     "dest_iban": "DE89370400440532013000",
///     "dest_bank_name": "Deutsche Bank",
///     "created_at": "2025-06-01T12:00:00Z"
///   },
///   "error": null
/// }
/// ```
///
/// # Validation
///
/// - Both currencies, a positive amount, IBAN, and bank name are required
/// - Amount must not exceed the per-currency transaction limit
/// - Sender wallet must be active and sufficiently funded
///
/// # Idempotency
///
/// Replaying the same key with the same payout returns the original payment;
/// the same key with different fields is rejected as a duplicate.
pub async fn create_payout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    body: Result<Json<CreatePayoutRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|_| AppError::InvalidRequest)?;

    // Field-level validation before any lookups
    let fields = request.validate();
    if !fields.is_empty() {
        return Err(AppError::ValidationFailed(fields));
    }

    let idempotency_key = idempotency_key(&headers)?;
    let source_currency = parse_currency(&request.source_currency)?;
    let dest_currency = parse_currency(&request.dest_currency)?;

    // Debit now, submit to the provider, settle later via webhook
    let payment = payout::create_external_payout(
        &state,
        PayoutRequest {
            sender_user_id: auth.user_id,
            source_currency,
            dest_currency,
            amount: request.amount,
            dest_iban: request.dest_iban,
            dest_bank_name: request.dest_bank_name,
            idempotency_key,
        },
    )
    .await?;

    Ok(created(
        StatusCode::ACCEPTED,
        payment.id,
        PaymentResponse::from(payment),
    ))
}

/// Get payment details by ID.
///
/// # Endpoint
///
/// `GET /api/v1/payments/:id`
///
/// # Response
///
/// - **Success (200 OK)**: the payment, in the standard envelope
/// - **Error (404)**: payment absent or owned by another user
///
/// # Security
///
/// The payment is returned only when its source account belongs to the
/// authenticated user. An unparsable id, a missing payment, and a payment
/// owned by someone else all look identical to the caller, so existence
/// never leaks across tenants.
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    // A non-UUID path segment is indistinguishable from a missing payment
    let payment_id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;

    let payment = transfer::get_payment_for_user(&state, payment_id, auth.user_id).await?;

    Ok(response::success(
        StatusCode::OK,
        PaymentResponse::from(payment),
    ))
}

/// Pull the `Idempotency-Key` header; every mutating payment operation
/// requires one.
fn idempotency_key(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .ok_or(AppError::MissingIdempotencyKey)
}

fn parse_currency(value: &str) -> Result<Currency, AppError> {
    Currency::parse(value).ok_or(AppError::InvalidCurrency)
}

/// Success envelope plus a `Location` header pointing at the new payment.
fn created(status: StatusCode, payment_id: Uuid, payload: PaymentResponse) -> Response {
    let mut res = response::success(status, payload);
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/payments/{payment_id}")) {
        res.headers_mut().insert(header::LOCATION, location);
    }
    res
}
