//! Idempotency middleware for mutating requests.
//!
//! Every mutating request must carry an `Idempotency-Key`. The first attempt
//! runs the handler and records the final response (errors included, so a
//! malformed retry replays the same 400); a retry with the same key and an
//! identical request replays that response byte-for-byte with
//! `X-Idempotent-Replayed: true`; the same key with a different request is a
//! client bug and is rejected as a conflict. Entries are scoped per user and
//! expire after the configured TTL.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::store::idempotency::{self, IdempotencyEntry};

/// Mutating request bodies are buffered for hashing; 1 MiB is far beyond any
/// legitimate payload.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Idempotency middleware function.
///
/// # Flow
///
/// 1. Pass reads (GET/HEAD/OPTIONS) straight through
/// 2. Require a non-empty `Idempotency-Key` header
/// 3. Require the authenticated user injected by the auth middleware
/// 4. Buffer the body and hash (method, path, body)
/// 5. Cache hit with matching hash: replay the stored response
/// 6. Cache hit with different hash: 409 conflict
/// 7. Miss: run the handler, store its response, return it
///
/// # Headers
///
/// - Request: `Idempotency-Key: <client-chosen opaque token>`
/// - Replayed response: `X-Idempotent-Replayed: true`
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Reads are naturally idempotent
    let method = request.method();
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    // Step 2: Every mutating request must carry a key
    let key = request
        .headers()
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .ok_or(AppError::MissingIdempotencyKey)?;

    // Step 3: The auth middleware runs first and provides the cache scope
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(AppError::MissingToken)?;

    // Step 4: Buffer the body so it can be hashed and then replayed into
    // the handler
    let (parts, body) = request.into_parts();
    let body_bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::InvalidRequest)?;

    let request_hash = compute_request_hash(parts.method.as_str(), parts.uri.path(), &body_bytes);

    // Steps 5 and 6: consult the cache
    if let Some(cached) = idempotency::get(&state.pool, &key, auth.user_id).await? {
        if cached.request_hash != request_hash {
            return Err(AppError::IdempotencyConflict);
        }

        let status =
            StatusCode::from_u16(cached.status_code as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok((
            status,
            [
                (header::CONTENT_TYPE.as_str(), "application/json"),
                ("X-Idempotent-Replayed", "true"),
            ],
            cached.response_body,
        )
            .into_response());
    }

    // Step 7: Miss. Run the operation with the body restored, then capture
    // whatever it produced
    let request = Request::from_parts(parts, Body::from(body_bytes.clone()));
    let response = next.run(request).await;

    let (response_parts, response_body) = response.into_parts();
    let response_bytes = to_bytes(response_body, usize::MAX)
        .await
        .map_err(|_| AppError::InvalidRequest)?;

    let now = Utc::now();
    let entry = IdempotencyEntry {
        idempotency_key: key.clone(),
        user_id: auth.user_id,
        request_hash,
        status_code: response_parts.status.as_u16() as i32,
        response_body: response_bytes.to_vec(),
        created_at: now,
        expires_at: now + Duration::hours(state.config.idempotency_ttl_hours),
    };

    // Insert is first-writer-wins; losing the race is harmless because this
    // response is returned regardless.
    if let Err(err) = idempotency::insert(&state.pool, &entry).await {
        tracing::error!(idempotency_key = %key, error = %err, "idempotency cache store failed");
    }

    Ok(Response::from_parts(response_parts, Body::from(response_bytes)))
}

/// Hex SHA-256 over the concatenation of method, path, and body bytes.
fn compute_request_hash(method: &str, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_requests_hash_identically() {
        let a = compute_request_hash("POST", "/api/v1/payments", b"{\"amount\":1}");
        let b = compute_request_hash("POST", "/api/v1/payments", b"{\"amount\":1}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_is_sensitive_to_every_component() {
        let base = compute_request_hash("POST", "/api/v1/payments", b"{}");
        assert_ne!(base, compute_request_hash("PUT", "/api/v1/payments", b"{}"));
        assert_ne!(base, compute_request_hash("POST", "/api/v1/accounts", b"{}"));
        assert_ne!(base, compute_request_hash("POST", "/api/v1/payments", b"{ }"));
    }
}
