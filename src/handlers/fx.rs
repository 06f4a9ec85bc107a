//! FX rate quote HTTP handler.
//!
//! Exposes the static rate table with the configured spread applied, so
//! clients can preview what a cross-currency transfer will yield.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::account::Currency;
use crate::response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
}

/// Quote returned to clients. Rates serialize as decimal strings so no
/// precision is lost in JSON.
#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub mid_market_rate: Decimal,
    pub effective_rate: Decimal,
    pub spread_pct: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Get the rate for a currency pair.
///
/// # Endpoint
///
/// `GET /api/v1/fx/rate?from=USD&to=EUR`
///
/// # Response (200)
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "from_currency": "USD",
///     "to_currency": "EUR",
///     "mid_market_rate": "0.92",
///     "effective_rate": "0.9154",
///     "spread_pct": "0.005",
///     "timestamp": "2025-06-01T12:00:00Z"
///   },
///   "error": null
/// }
/// ```
///
/// # Validation
///
/// Both `from` and `to` must be USD, EUR, or GBP; anything else is a 400
/// `INVALID_CURRENCY`. An identity pair quotes exactly 1 with zero spread.
pub async fn get_rate(
    State(state): State<AppState>,
    Query(query): Query<RateQuery>,
) -> Result<Response, AppError> {
    // Validate both currency codes before quoting
    let from = Currency::parse(&query.from).ok_or(AppError::InvalidCurrency)?;
    let to = Currency::parse(&query.to).ok_or(AppError::InvalidCurrency)?;

    let quote = state.fx.get_rate(from, to)?;

    Ok(response::success(
        StatusCode::OK,
        RateResponse {
            from_currency: quote.from_currency,
            to_currency: quote.to_currency,
            mid_market_rate: quote.mid_market_rate,
            effective_rate: quote.effective_rate,
            spread_pct: quote.spread_pct,
            timestamp: Utc::now(),
        },
    ))
}
