//! Provider webhook intake.
//!
//! The banking provider confirms payout outcomes by POSTing signed callbacks
//! to this endpoint. Intake does no business logic: it authenticates the
//! callback, validates its shape, and durably records it exactly once.
//! Acknowledgement is therefore fast and always safe to repeat; the state
//! transition happens in the background processor.
//!
//! # Security
//!
//! - Callbacks carry `X-Webhook-Signature`: HMAC-SHA256 of the raw body
//!   under the shared secret, as lowercase hex
//! - Signatures are compared in constant time
//! - Bodies are capped at 1 MiB by the route's body limit

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::webhook::{ProviderCallback, WebhookEvent, WebhookEventStatus};
use crate::response;
use crate::state::AppState;
use crate::store::webhook_events;

type HmacSha256 = Hmac<Sha256>;

/// Receive a provider outcome callback.
///
/// # Endpoint
///
/// `POST /api/v1/webhooks/provider`
///
/// # Request Body
///
/// ```json
/// {
///   "event_id": "990e8400-...",
///   "payment_id": "880e8400-...",
///   "status": "completed",
///   "provider_ref": "prov-ref-123",
///   "timestamp": "2025-06-01T12:00:00Z"
/// }
/// ```
///
/// # Headers
///
/// - `X-Webhook-Signature: <lowercase-hex HMAC-SHA256 of the body>`
///
/// # Response
///
/// - **200** `{"status": "received"}` when stored
/// - **200** `{"status": "already_received"}` on duplicate delivery
/// - **401** `INVALID_SIGNATURE` when the HMAC does not match
/// - **400** `INVALID_REQUEST` / `VALIDATION_FAILED` for malformed payloads
pub async fn receive_provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    // Step 1: Verify the HMAC signature over the raw body
    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(&body, signature, state.config.webhook_secret.as_bytes()) {
        tracing::warn!("webhook signature verification failed");
        return Err(AppError::InvalidSignature);
    }

    // Step 2: Parse and validate the callback fields
    let callback: ProviderCallback =
        serde_json::from_slice(&body).map_err(|_| AppError::InvalidRequest)?;

    let fields = callback.validate();
    if !fields.is_empty() {
        return Err(AppError::ValidationFailed(fields));
    }

    // Step 3: Keep the raw payload for the processor to replay later
    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| AppError::InvalidRequest)?;

    let event = WebhookEvent {
        id: Uuid::new_v4(),
        idempotency_key: callback.event_id.clone(),
        event_type: callback.event_type(),
        payload,
        status: WebhookEventStatus::Pending,
        attempts: 0,
        last_attempt: None,
        created_at: Utc::now(),
    };

    // Step 4: Store it; the unique index on the provider event id collapses
    // duplicate deliveries into one row
    match webhook_events::create(&state.pool, &event).await {
        Ok(()) => {
            tracing::info!(
                webhook_event_id = %event.id,
                provider_event_id = %callback.event_id,
                payment_id = %callback.payment_id,
                "webhook event stored"
            );
            Ok(response::success(
                StatusCode::OK,
                serde_json::json!({ "status": "received" }),
            ))
        }
        // The provider re-delivered an event we already hold.
        Err(AppError::DuplicateIdempotencyKey) => {
            tracing::info!(
                provider_event_id = %callback.event_id,
                payment_id = %callback.payment_id,
                "duplicate webhook received"
            );
            Ok(response::success(
                StatusCode::OK,
                serde_json::json!({ "status": "already_received" }),
            ))
        }
        Err(other) => Err(other),
    }
}

/// Constant-time HMAC comparison via the mac itself; hex decoding failures
/// and absent signatures are rejected outright.
fn verify_signature(body: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    if signature_hex.is_empty() {
        return false;
    }
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"event_id":"abc"}"#;
        let sig = sign(body, b"shared-secret");
        assert!(verify_signature(body, &sig, b"shared-secret"));
    }

    #[test]
    fn rejects_tampered_body() {
        let body = br#"{"event_id":"abc"}"#;
        let sig = sign(body, b"shared-secret");
        assert!(!verify_signature(br#"{"event_id":"abd"}"#, &sig, b"shared-secret"));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = br#"{"event_id":"abc"}"#;
        let sig = sign(body, b"shared-secret");
        assert!(!verify_signature(body, &sig, b"other-secret"));
    }

    #[test]
    fn rejects_missing_or_malformed_signature() {
        let body = b"{}";
        assert!(!verify_signature(body, "", b"secret"));
        assert!(!verify_signature(body, "not-hex!", b"secret"));
        assert!(!verify_signature(body, "deadbeef", b"secret"));
    }
}
