//! Provider webhook models.
//!
//! The banking provider confirms payout outcomes by POSTing a signed
//! callback. Intake persists the callback as a `WebhookEvent` row and
//! acknowledges immediately; the background processor applies the state
//! transition later. The provider's `event_id` doubles as the row's unique
//! idempotency key, which collapses duplicate deliveries into one row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::response::FieldError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Pending,
    Dispatched,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum WebhookEventType {
    #[serde(rename = "payment.completed")]
    #[sqlx(rename = "payment.completed")]
    PaymentCompleted,
    #[serde(rename = "payment.failed")]
    #[sqlx(rename = "payment.failed")]
    PaymentFailed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,

    /// Provider-supplied event id; unique index dedupes re-deliveries.
    pub idempotency_key: String,

    pub event_type: WebhookEventType,
    pub payload: serde_json::Value,
    pub status: WebhookEventStatus,
    pub attempts: i32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Callback body the provider sends to `/api/v1/webhooks/provider`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderCallback {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub payment_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

impl ProviderCallback {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errs = Vec::new();

        if self.event_id.is_empty() {
            errs.push(FieldError::new("event_id", "required"));
        } else if Uuid::parse_str(&self.event_id).is_err() {
            errs.push(FieldError::new("event_id", "must be a valid UUID"));
        }

        if self.payment_id.is_empty() {
            errs.push(FieldError::new("payment_id", "required"));
        } else if Uuid::parse_str(&self.payment_id).is_err() {
            errs.push(FieldError::new("payment_id", "must be a valid UUID"));
        }

        if self.status.is_empty() {
            errs.push(FieldError::new("status", "required"));
        } else if self.status != "completed" && self.status != "failed" {
            errs.push(FieldError::new("status", "must be completed or failed"));
        }

        errs
    }

    pub fn event_type(&self) -> WebhookEventType {
        if self.status == "completed" {
            WebhookEventType::PaymentCompleted
        } else {
            WebhookEventType::PaymentFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback() -> ProviderCallback {
        ProviderCallback {
            event_id: Uuid::new_v4().to_string(),
            payment_id: Uuid::new_v4().to_string(),
            status: "completed".to_string(),
            provider_ref: Some("prov-ref-123".to_string()),
            reason: None,
            timestamp: "2025-06-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn valid_callback_passes() {
        assert!(callback().validate().is_empty());
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let cb = ProviderCallback {
            event_id: String::new(),
            payment_id: String::new(),
            status: String::new(),
            provider_ref: None,
            reason: None,
            timestamp: String::new(),
        };
        let fields: Vec<_> = cb.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["event_id", "payment_id", "status"]);
    }

    #[test]
    fn non_uuid_ids_are_rejected() {
        let mut cb = callback();
        cb.payment_id = "not-a-uuid".to_string();
        let errs = cb.validate();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "must be a valid UUID");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut cb = callback();
        cb.status = "maybe".to_string();
        let errs = cb.validate();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].field, "status");
    }

    #[test]
    fn status_maps_to_event_type() {
        let mut cb = callback();
        assert!(matches!(cb.event_type(), WebhookEventType::PaymentCompleted));
        cb.status = "failed".to_string();
        assert!(matches!(cb.event_type(), WebhookEventType::PaymentFailed));
    }
}
