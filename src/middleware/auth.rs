//! Bearer-token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the bearer token from the Authorization header
//! 2. Hash it and verify it exists in the database
//! 3. Inject the authenticated user into the request
//! 4. Reject unauthenticated requests with HTTP 401
//!
//! Tokens are stored as SHA-256 hashes; the presented token is hashed and
//! looked up, never persisted or logged in the clear.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Authentication context attached to every authenticated request.
///
/// This struct is inserted into the request's extension map and can be
/// extracted by route handlers to know who made the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// ID of the authenticated user
    ///
    /// Used to scope database queries (e.g. only show this user's wallets)
    /// and as the idempotency-cache partition key.
    pub user_id: Uuid,
}

/// Bearer-token authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from the request
/// 2. Hash the `<token>` using SHA-256
/// 3. Query the database for a matching active token
/// 4. If found: inject `AuthUser` into the request, call the next handler
/// 5. If not found: return 401 Unauthorized
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Arguments
///
/// * `State(state)` - Shared application state injected by Axum
/// * `request` - Incoming HTTP request (mutable to add extensions)
/// * `next` - Next middleware/handler in the chain
///
/// # Returns
///
/// - `Ok(Response)` if authenticated successfully (calls next handler)
/// - `Err(AppError::MissingToken)` if no Authorization header is present
/// - `Err(AppError::InvalidToken)` if the header is malformed or the token
///   is unknown or revoked
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Extract the Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::MissingToken)?;

    // Step 2: Extract the bearer token
    // Expected format: "Bearer <token>"
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::InvalidToken)?;

    // Step 3: Hash the token using SHA-256
    let token_hash = hash_token(token);

    // Step 4: Look up the hashed token in the database
    let user_id: Uuid = sqlx::query_scalar(
        "SELECT user_id FROM api_tokens WHERE token_hash = $1 AND is_active = true",
    )
    .bind(&token_hash)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::InvalidToken)?;

    // Step 5: Inject the authenticated user into the request extensions
    // Route handlers can now extract this using Extension<AuthUser>
    request.extensions_mut().insert(AuthUser { user_id });

    // Step 6: Call the next middleware/handler
    Ok(next.run(request).await)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_hex() {
        let hash = hash_token("secret-token");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("secret-token"));
        assert_ne!(hash, hash_token("other-token"));
    }
}
