//! Background webhook processor.
//!
//! A single cooperative loop drains the durable webhook queue that intake
//! fills: each tick claims a batch of pending events (skip-locked, oldest
//! first) and applies them sequentially. Completion only touches the payment
//! row; failure runs the compensating reversal under the same locking
//! discipline as the original debit. Processing errors leave the row pending
//! for the next tick; malformed events are poison and are marked failed.

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, AccountType};
use crate::models::ledger::EntryType;
use crate::models::payment::{Payment, PaymentEventType, PaymentStatus};
use crate::models::webhook::{ProviderCallback, WebhookEvent, WebhookEventStatus};
use crate::services::transfer::{Leg, apply_legs, plan_leg, write_payment_event};
use crate::state::AppState;
use crate::store::{accounts, payments, webhook_events};

pub struct WebhookProcessor {
    state: AppState,
}

impl WebhookProcessor {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run until the shutdown signal flips. The iteration in flight finishes
    /// before the loop returns; no new iteration starts after the signal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = std::time::Duration::from_millis(self.state.config.webhook_poll_interval_ms);
        tracing::info!(interval_ms = interval.as_millis() as u64, "webhook processor started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("webhook processor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.poll().await;
                }
            }
        }
    }

    async fn poll(&self) {
        let events =
            match webhook_events::claim_pending(&self.state.pool, self.state.config.webhook_batch_size)
                .await
            {
                Ok(events) => events,
                Err(err) => {
                    tracing::error!(error = %err, "failed to fetch pending webhook events");
                    return;
                }
            };

        for event in events {
            if let Err(err) = self.process_event(&event).await {
                tracing::error!(
                    webhook_event_id = %event.id,
                    error = %err,
                    "failed to process webhook event"
                );
                // Transient failure: record the attempt, stay pending, retry
                // on a later tick.
                if let Err(err) = webhook_events::mark_attempt(&self.state.pool, event.id).await {
                    tracing::error!(webhook_event_id = %event.id, error = %err, "failed to record attempt");
                }
            }
        }
    }

    async fn process_event(&self, event: &WebhookEvent) -> Result<(), AppError> {
        let callback: ProviderCallback = match serde_json::from_value(event.payload.clone()) {
            Ok(callback) => callback,
            Err(err) => {
                tracing::error!(webhook_event_id = %event.id, error = %err, "malformed webhook payload");
                return self.finish(event.id, WebhookEventStatus::Failed).await;
            }
        };

        let payment_id = match Uuid::parse_str(&callback.payment_id) {
            Ok(id) => id,
            Err(_) => {
                tracing::error!(
                    webhook_event_id = %event.id,
                    payment_id = %callback.payment_id,
                    "invalid payment_id in webhook"
                );
                return self.finish(event.id, WebhookEventStatus::Failed).await;
            }
        };

        let Some(payment) = payments::get_by_id(&self.state.pool, payment_id).await? else {
            tracing::warn!(
                webhook_event_id = %event.id,
                payment_id = %payment_id,
                "payment not found for webhook"
            );
            return self.finish(event.id, WebhookEventStatus::Failed).await;
        };

        // Re-delivery for a settled payment: acknowledge without touching
        // the ledger.
        if payment.status.is_terminal() {
            tracing::info!(
                webhook_event_id = %event.id,
                payment_id = %payment.id,
                payment_status = ?payment.status,
                "payment already in terminal state, skipping"
            );
            return self.finish(event.id, WebhookEventStatus::Dispatched).await;
        }

        match callback.status.as_str() {
            "completed" => {
                self.handle_completed(&payment, callback.provider_ref.as_deref())
                    .await?
            }
            "failed" => {
                let reason = callback.reason.as_deref().unwrap_or("provider_failure");
                self.handle_failed(&payment, reason).await?
            }
            other => {
                tracing::error!(webhook_event_id = %event.id, status = other, "unknown webhook status");
                return self.finish(event.id, WebhookEventStatus::Failed).await;
            }
        }

        self.finish(event.id, WebhookEventStatus::Dispatched).await
    }

    async fn finish(&self, event_id: Uuid, status: WebhookEventStatus) -> Result<(), AppError> {
        webhook_events::update_status(&self.state.pool, event_id, status).await
    }

    /// Funds already sit in the outgoing account, so completion is a status
    /// transition plus audit event; no balances move.
    async fn handle_completed(
        &self,
        payment: &Payment,
        provider_ref: Option<&str>,
    ) -> Result<(), AppError> {
        let mut tx = self.state.pool.begin().await?;

        let now = Utc::now();
        payments::update_status(
            &mut tx,
            payment.id,
            PaymentStatus::Completed,
            provider_ref,
            None,
            Some(now),
        )
        .await?;

        write_payment_event(&mut tx, payment.id, PaymentEventType::Completed, "system", None, now)
            .await?;

        tx.commit().await?;

        tracing::info!(payment_id = %payment.id, provider_ref = ?provider_ref, "payment completed");
        Ok(())
    }

    /// Compensating reversal: every ledger leg of the original payout is
    /// written back in reverse order, restoring the sender, the outgoing
    /// account, and (cross-currency) both FX pools to their pre-payment
    /// balances. The original entries stay in the ledger as history.
    async fn handle_failed(&self, payment: &Payment, reason: &str) -> Result<(), AppError> {
        let is_cross_currency = payment.source_currency != payment.dest_currency;

        let outgoing = accounts::get_system_account(
            &self.state.pool,
            AccountType::Outgoing,
            payment.dest_currency,
        )
        .await?;

        let mut account_ids = vec![payment.source_account_id, outgoing.id];

        let mut fx_pool_ids = None;
        if is_cross_currency {
            let fx_src = accounts::get_system_account(
                &self.state.pool,
                AccountType::FxPool,
                payment.source_currency,
            )
            .await?;
            let fx_dst = accounts::get_system_account(
                &self.state.pool,
                AccountType::FxPool,
                payment.dest_currency,
            )
            .await?;
            account_ids.push(fx_src.id);
            account_ids.push(fx_dst.id);
            fx_pool_ids = Some((fx_src.id, fx_dst.id));
        }

        let mut tx = self.state.pool.begin().await?;

        let locked = accounts::lock_in_order(&mut tx, &account_ids).await?;

        let now = Utc::now();
        payments::update_status(
            &mut tx,
            payment.id,
            PaymentStatus::Failed,
            None,
            Some(reason),
            None,
        )
        .await?;

        let legs = match fx_pool_ids {
            None => same_currency_reversal_legs(payment, &locked[&payment.source_account_id], &locked[&outgoing.id]),
            Some((fx_src_id, fx_dst_id)) => cross_currency_reversal_legs(
                payment,
                &locked[&payment.source_account_id],
                &locked[&outgoing.id],
                &locked[&fx_src_id],
                &locked[&fx_dst_id],
            ),
        };
        apply_legs(&mut tx, payment.id, &legs, now).await?;

        write_payment_event(
            &mut tx,
            payment.id,
            PaymentEventType::Failed,
            "system",
            Some(serde_json::json!({ "reason": reason })),
            now,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(payment_id = %payment.id, reason, "payment failed, reversal complete");
        Ok(())
    }
}

fn same_currency_reversal_legs(payment: &Payment, sender: &Account, outgoing: &Account) -> Vec<Leg> {
    vec![
        plan_leg(outgoing, EntryType::Debit, payment.dest_amount, payment.dest_currency),
        plan_leg(sender, EntryType::Credit, payment.source_amount, payment.source_currency),
    ]
}

/// Original legs: debit sender, credit fx source, debit fx dest, credit
/// outgoing. The reversal walks them backwards so every intermediate balance
/// stays non-negative.
fn cross_currency_reversal_legs(
    payment: &Payment,
    sender: &Account,
    outgoing: &Account,
    fx_pool_source: &Account,
    fx_pool_dest: &Account,
) -> Vec<Leg> {
    vec![
        plan_leg(outgoing, EntryType::Debit, payment.dest_amount, payment.dest_currency),
        plan_leg(fx_pool_dest, EntryType::Credit, payment.dest_amount, payment.dest_currency),
        plan_leg(fx_pool_source, EntryType::Debit, payment.source_amount, payment.source_currency),
        plan_leg(sender, EntryType::Credit, payment.source_amount, payment.source_currency),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::{AccountStatus, Currency};
    use crate::models::payment::PaymentType;

    fn account(currency: Currency, balance: i64) -> Account {
        Account {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            currency,
            account_type: AccountType::User,
            balance,
            version: 1,
            account_number: None,
            iban: None,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn payout(source: Currency, dest: Currency, source_amount: i64, dest_amount: i64) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            idempotency_key: Uuid::new_v4().to_string(),
            payment_type: PaymentType::ExternalPayout,
            status: PaymentStatus::Pending,
            source_account_id: Uuid::new_v4(),
            dest_account_id: None,
            dest_iban: Some("DE89370400440532013000".to_string()),
            dest_bank_name: Some("Deutsche Bank".to_string()),
            source_amount,
            source_currency: source,
            dest_amount,
            dest_currency: dest,
            exchange_rate: None,
            fee_amount: 0,
            fee_currency: None,
            provider_ref: None,
            failure_reason: None,
            metadata: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn same_currency_reversal_restores_sender() {
        // After the original payout: sender already debited, outgoing credited.
        let sender = account(Currency::Usd, 5_000);
        let outgoing = account(Currency::Usd, 5_000);
        let payment = payout(Currency::Usd, Currency::Usd, 5_000, 5_000);

        let legs = same_currency_reversal_legs(&payment, &sender, &outgoing);

        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].account_id, outgoing.id);
        assert_eq!(legs[0].entry_type, EntryType::Debit);
        assert_eq!(legs[0].balance_after, 0);
        assert_eq!(legs[1].account_id, sender.id);
        assert_eq!(legs[1].entry_type, EntryType::Credit);
        assert_eq!(legs[1].balance_after, 10_000);
    }

    #[test]
    fn cross_currency_reversal_walks_legs_backwards() {
        // Post-payout balances for a 10_000 USD -> 9_154 EUR payout.
        let sender = account(Currency::Usd, 0);
        let fx_usd = account(Currency::Usd, 1_010_000);
        let fx_eur = account(Currency::Eur, 990_846);
        let outgoing = account(Currency::Eur, 9_154);
        let payment = payout(Currency::Usd, Currency::Eur, 10_000, 9_154);

        let legs = cross_currency_reversal_legs(&payment, &sender, &outgoing, &fx_usd, &fx_eur);

        assert_eq!(legs.len(), 4);

        // Reverse order of the original: outgoing unwinds first, sender last.
        assert_eq!(legs[0].account_id, outgoing.id);
        assert_eq!(legs[1].account_id, fx_eur.id);
        assert_eq!(legs[2].account_id, fx_usd.id);
        assert_eq!(legs[3].account_id, sender.id);

        // Every intermediate balance stays non-negative.
        for leg in &legs {
            assert!(leg.balance_after >= 0, "leg for {} went negative", leg.account_id);
        }

        // Pre-payment balances restored.
        assert_eq!(legs[0].balance_after, 0);
        assert_eq!(legs[1].balance_after, 1_000_000);
        assert_eq!(legs[2].balance_after, 1_000_000);
        assert_eq!(legs[3].balance_after, 10_000);
    }

    #[test]
    fn reversal_books_balance_per_currency() {
        let sender = account(Currency::Usd, 0);
        let fx_usd = account(Currency::Usd, 1_010_000);
        let fx_eur = account(Currency::Eur, 990_846);
        let outgoing = account(Currency::Eur, 9_154);
        let payment = payout(Currency::Usd, Currency::Eur, 10_000, 9_154);

        let legs = cross_currency_reversal_legs(&payment, &sender, &outgoing, &fx_usd, &fx_eur);

        for currency in [Currency::Usd, Currency::Eur] {
            let debits: i64 = legs
                .iter()
                .filter(|l| l.currency == currency && l.entry_type == EntryType::Debit)
                .map(|l| l.amount)
                .sum();
            let credits: i64 = legs
                .iter()
                .filter(|l| l.currency == currency && l.entry_type == EntryType::Credit)
                .map(|l| l.amount)
                .sum();
            assert_eq!(debits, credits, "{currency} reversal must balance");
        }
    }
}
