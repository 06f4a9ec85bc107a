//! Outbound submission of pending payouts to the banking provider.
//!
//! A thin fire-and-forget POST: the provider acknowledges with 202 and later
//! confirms the outcome through a signed webhook. Anything other than a 202
//! is logged by the caller and the payment simply stays pending.

use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::models::account::Currency;
use crate::models::payment::Payment;

pub struct ProviderClient {
    base_url: String,
    callback_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ProviderPayload<'a> {
    payment_id: Uuid,
    amount: i64,
    currency: Currency,
    dest_iban: &'a str,
    dest_bank_name: &'a str,
    callback_url: &'a str,
}

impl ProviderClient {
    pub fn new(base_url: &str, callback_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            callback_url: callback_url.to_string(),
            client,
        })
    }

    pub async fn submit_payment(&self, payment: &Payment) -> anyhow::Result<()> {
        let payload = ProviderPayload {
            payment_id: payment.id,
            amount: payment.dest_amount,
            currency: payment.dest_currency,
            dest_iban: payment.dest_iban.as_deref().unwrap_or_default(),
            dest_bank_name: payment.dest_bank_name.as_deref().unwrap_or_default(),
            callback_url: &self.callback_url,
        };

        tracing::info!(payment_id = %payment.id, "provider request sent");
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(format!("{}/process", self.base_url))
            .json(&payload)
            .send()
            .await?;

        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "provider response received"
        );

        if response.status() != reqwest::StatusCode::ACCEPTED {
            anyhow::bail!("unexpected provider status {}", response.status());
        }

        Ok(())
    }
}
