//! Payment data models and API request/response types.
//!
//! A payment is the unit of value movement: either an internal transfer
//! between two wallets (settled synchronously) or an external payout through
//! the banking provider (debited immediately, resolved asynchronously by a
//! signed webhook).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::account::Currency;
use crate::response::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentType {
    InternalTransfer,
    ExternalPayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl PaymentStatus {
    /// Terminal payments never transition again; re-delivered webhooks for
    /// them are acknowledged without any ledger writes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Reversed
        )
    }
}

/// Payment row.
///
/// `idempotency_key` is globally unique: the database index makes a
/// concurrent duplicate submission lose the insert race instead of minting a
/// second payment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub idempotency_key: String,
    #[sqlx(rename = "type")]
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub source_account_id: Uuid,

    /// Destination wallet, internal transfers only.
    pub dest_account_id: Option<Uuid>,

    /// Destination bank details, external payouts only.
    pub dest_iban: Option<String>,
    pub dest_bank_name: Option<String>,

    pub source_amount: i64,
    pub source_currency: Currency,
    pub dest_amount: i64,
    pub dest_currency: Currency,

    /// Effective rate applied, cross-currency payments only.
    pub exchange_rate: Option<Decimal>,

    /// Implicit FX fee in `fee_currency` minor units.
    pub fee_amount: i64,
    pub fee_currency: Option<Currency>,

    pub provider_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Audit-trail event kinds attached to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentEventType {
    Created,
    Processing,
    Completed,
    Failed,
    Reversed,
}

/// Append-only audit record. `actor` is `"user:<uuid>"` for customer-driven
/// transitions and `"system"` for processor-driven ones.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentEvent {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub event_type: PaymentEventType,
    pub actor: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/payments` (internal transfer).
#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub recipient_unique_name: String,
    pub source_currency: String,
    pub dest_currency: String,
    pub amount: i64,
}

impl CreateTransferRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errs = Vec::new();

        if self.recipient_unique_name.is_empty() {
            errs.push(FieldError::new("recipient_unique_name", "required"));
        }

        validate_currency_field(&mut errs, "source_currency", &self.source_currency);
        validate_currency_field(&mut errs, "dest_currency", &self.dest_currency);

        if self.amount <= 0 {
            errs.push(FieldError::new("amount", "must be greater than 0"));
        }

        errs
    }
}

/// Request body for `POST /api/v1/payments/external` (external payout).
#[derive(Debug, Deserialize)]
pub struct CreatePayoutRequest {
    pub source_currency: String,
    pub dest_currency: String,
    pub amount: i64,
    pub dest_iban: String,
    pub dest_bank_name: String,
}

impl CreatePayoutRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errs = Vec::new();

        validate_currency_field(&mut errs, "source_currency", &self.source_currency);
        validate_currency_field(&mut errs, "dest_currency", &self.dest_currency);

        if self.amount <= 0 {
            errs.push(FieldError::new("amount", "must be greater than 0"));
        }
        if self.dest_iban.is_empty() {
            errs.push(FieldError::new("dest_iban", "required"));
        }
        if self.dest_bank_name.is_empty() {
            errs.push(FieldError::new("dest_bank_name", "required"));
        }

        errs
    }
}

fn validate_currency_field(errs: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if value.is_empty() {
        errs.push(FieldError::new(field, "required"));
    } else if Currency::parse(value).is_none() {
        errs.push(FieldError::new(field, "must be USD, EUR, or GBP"));
    }
}

/// Response body for payment endpoints. Bank details are omitted for
/// internal transfers, wallet ids for payouts.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub source_account_id: Uuid,
    pub dest_account_id: Option<Uuid>,
    pub source_amount: i64,
    pub source_currency: Currency,
    pub dest_amount: i64,
    pub dest_currency: Currency,
    pub exchange_rate: Option<Decimal>,
    pub fee_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_currency: Option<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            payment_type: p.payment_type,
            status: p.status,
            source_account_id: p.source_account_id,
            dest_account_id: p.dest_account_id,
            source_amount: p.source_amount,
            source_currency: p.source_currency,
            dest_amount: p.dest_amount,
            dest_currency: p.dest_currency,
            exchange_rate: p.exchange_rate,
            fee_amount: p.fee_amount,
            fee_currency: p.fee_currency,
            dest_iban: p.dest_iban,
            dest_bank_name: p.dest_bank_name,
            provider_ref: p.provider_ref,
            failure_reason: p.failure_reason,
            created_at: p.created_at,
            completed_at: p.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_request() -> CreateTransferRequest {
        CreateTransferRequest {
            recipient_unique_name: "alice".to_string(),
            source_currency: "USD".to_string(),
            dest_currency: "EUR".to_string(),
            amount: 5_000,
        }
    }

    #[test]
    fn valid_transfer_request_passes() {
        assert!(transfer_request().validate().is_empty());
    }

    #[test]
    fn transfer_request_rejects_missing_recipient() {
        let mut req = transfer_request();
        req.recipient_unique_name.clear();
        let errs = req.validate();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "recipient_unique_name");
    }

    #[test]
    fn transfer_request_rejects_unknown_currency() {
        let mut req = transfer_request();
        req.dest_currency = "XYZ".to_string();
        let errs = req.validate();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "dest_currency");
        assert_eq!(errs[0].message, "must be USD, EUR, or GBP");
    }

    #[test]
    fn transfer_request_rejects_non_positive_amount() {
        for amount in [0, -1] {
            let mut req = transfer_request();
            req.amount = amount;
            let errs = req.validate();
            assert_eq!(errs.len(), 1);
            assert_eq!(errs[0].field, "amount");
        }
    }

    #[test]
    fn payout_request_requires_bank_details() {
        let req = CreatePayoutRequest {
            source_currency: "USD".to_string(),
            dest_currency: "USD".to_string(),
            amount: 1_000,
            dest_iban: String::new(),
            dest_bank_name: String::new(),
        };
        let fields: Vec<_> = req.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["dest_iban", "dest_bank_name"]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Reversed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
    }
}
