//! External payout creation.
//!
//! A payout debits the sender immediately and parks the funds in the
//! per-currency outgoing clearing account, then submits to the banking
//! provider fire-and-forget. The payment stays `pending` until a signed
//! webhook resolves it; a failure outcome reverses the debit leg-for-leg.
//! Debiting up front is what prevents double-spend between concurrent
//! pending payouts from the same wallet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, AccountType, Currency};
use crate::models::ledger::EntryType;
use crate::models::payment::{Payment, PaymentEventType, PaymentStatus, PaymentType};
use crate::services::transfer::{apply_legs, plan_leg, verify_active, write_payment_event};
use crate::state::AppState;
use crate::store::{accounts, payments};

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub sender_user_id: Uuid,
    pub source_currency: Currency,
    pub dest_currency: Currency,
    pub amount: i64,
    pub dest_iban: String,
    pub dest_bank_name: String,
    pub idempotency_key: String,
}

/// Create an external payout and return the pending payment.
pub async fn create_external_payout(
    state: &AppState,
    req: PayoutRequest,
) -> Result<Payment, AppError> {
    let sender = accounts::get_by_user_and_currency(
        &state.pool,
        req.sender_user_id,
        req.source_currency,
        AccountType::User,
    )
    .await?
    .ok_or(AppError::AccountNotFound)?;

    if let Some(existing) = check_payout_idempotency(state, &req, sender.id).await? {
        tracing::info!(
            payment_id = %existing.id,
            idempotency_key = %req.idempotency_key,
            "idempotent replay"
        );
        return Ok(existing);
    }

    validate_payout(&req, &sender, state)?;

    let result = if req.source_currency == req.dest_currency {
        execute_same_currency(state, &req, sender.id).await
    } else {
        execute_cross_currency(state, &req, sender.id).await
    };

    let payment = match result {
        Ok(p) => p,
        // Lost the insert race against a concurrent submission with the same
        // key: replay it if it matches, reject it otherwise.
        Err(AppError::DuplicateIdempotencyKey) => {
            match check_payout_idempotency(state, &req, sender.id).await? {
                Some(existing) => {
                    tracing::info!(
                        payment_id = %existing.id,
                        idempotency_key = %req.idempotency_key,
                        "idempotent replay after insert race"
                    );
                    return Ok(existing);
                }
                None => return Err(AppError::DuplicatePayment),
            }
        }
        Err(other) => return Err(other),
    };

    submit_to_provider(state, &payment).await;

    tracing::info!(
        payment_id = %payment.id,
        sender_account = %sender.id,
        source_amount = req.amount,
        source_currency = %req.source_currency,
        dest_amount = payment.dest_amount,
        dest_currency = %req.dest_currency,
        "external payout created"
    );

    Ok(payment)
}

/// Replay check: an existing payment under this key is returned as-is when
/// its identifying fields match the incoming request, and rejected as a
/// duplicate when they differ.
async fn check_payout_idempotency(
    state: &AppState,
    req: &PayoutRequest,
    sender_account_id: Uuid,
) -> Result<Option<Payment>, AppError> {
    let Some(existing) = payments::get_by_idempotency_key(&state.pool, &req.idempotency_key).await?
    else {
        return Ok(None);
    };

    if payout_matches(&existing, req, sender_account_id) {
        return Ok(Some(existing));
    }

    Err(AppError::DuplicatePayment)
}

fn payout_matches(existing: &Payment, req: &PayoutRequest, sender_account_id: Uuid) -> bool {
    existing.source_account_id == sender_account_id
        && existing.source_amount == req.amount
        && existing.source_currency == req.source_currency
        && existing.dest_currency == req.dest_currency
        && existing.payment_type == PaymentType::ExternalPayout
}

fn validate_payout(req: &PayoutRequest, sender: &Account, state: &AppState) -> Result<(), AppError> {
    if req.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }
    if req.dest_iban.is_empty() || req.dest_bank_name.is_empty() {
        return Err(AppError::InvalidRequest);
    }

    verify_active(sender)?;

    if req.amount > state.config.tx_limit(req.source_currency) {
        return Err(AppError::LimitExceeded);
    }

    Ok(())
}

async fn execute_same_currency(
    state: &AppState,
    req: &PayoutRequest,
    sender_id: Uuid,
) -> Result<Payment, AppError> {
    let outgoing =
        accounts::get_system_account(&state.pool, AccountType::Outgoing, req.dest_currency).await?;

    let mut tx = state.pool.begin().await?;

    let locked = accounts::lock_in_order(&mut tx, &[sender_id, outgoing.id]).await?;
    let sender = &locked[&sender_id];
    let outgoing_acct = &locked[&outgoing.id];

    verify_active(sender)?;
    if sender.balance < req.amount {
        return Err(AppError::InsufficientFunds);
    }

    let now = Utc::now();
    let payment = build_payment(req, sender_id, req.amount, None, None, 0, now);

    payments::create(&mut tx, &payment).await?;

    let legs = [
        plan_leg(sender, EntryType::Debit, req.amount, req.source_currency),
        plan_leg(outgoing_acct, EntryType::Credit, req.amount, req.dest_currency),
    ];
    apply_legs(&mut tx, payment.id, &legs, now).await?;

    write_payment_event(
        &mut tx,
        payment.id,
        PaymentEventType::Created,
        &format!("user:{}", req.sender_user_id),
        None,
        now,
    )
    .await?;

    tx.commit().await?;

    Ok(payment)
}

async fn execute_cross_currency(
    state: &AppState,
    req: &PayoutRequest,
    sender_id: Uuid,
) -> Result<Payment, AppError> {
    let conversion = state
        .fx
        .convert(req.amount, req.source_currency, req.dest_currency)?;

    let fx_pool_source =
        accounts::get_system_account(&state.pool, AccountType::FxPool, req.source_currency).await?;
    let fx_pool_dest =
        accounts::get_system_account(&state.pool, AccountType::FxPool, req.dest_currency).await?;
    let outgoing =
        accounts::get_system_account(&state.pool, AccountType::Outgoing, req.dest_currency).await?;

    let mut tx = state.pool.begin().await?;

    let locked = accounts::lock_in_order(
        &mut tx,
        &[sender_id, fx_pool_source.id, fx_pool_dest.id, outgoing.id],
    )
    .await?;
    let sender = &locked[&sender_id];
    let fx_src = &locked[&fx_pool_source.id];
    let fx_dst = &locked[&fx_pool_dest.id];
    let outgoing_acct = &locked[&outgoing.id];

    verify_active(sender)?;
    if sender.balance < req.amount {
        return Err(AppError::InsufficientFunds);
    }
    if fx_dst.balance < conversion.dest_amount {
        return Err(AppError::InsufficientFunds);
    }

    let now = Utc::now();
    let payment = build_payment(
        req,
        sender_id,
        conversion.dest_amount,
        Some(conversion.exchange_rate),
        Some(req.dest_currency),
        conversion.fee_amount,
        now,
    );

    payments::create(&mut tx, &payment).await?;

    let legs = [
        plan_leg(sender, EntryType::Debit, req.amount, req.source_currency),
        plan_leg(fx_src, EntryType::Credit, req.amount, req.source_currency),
        plan_leg(fx_dst, EntryType::Debit, conversion.dest_amount, req.dest_currency),
        plan_leg(outgoing_acct, EntryType::Credit, conversion.dest_amount, req.dest_currency),
    ];
    apply_legs(&mut tx, payment.id, &legs, now).await?;

    write_payment_event(
        &mut tx,
        payment.id,
        PaymentEventType::Created,
        &format!("user:{}", req.sender_user_id),
        None,
        now,
    )
    .await?;

    tx.commit().await?;

    Ok(payment)
}

fn build_payment(
    req: &PayoutRequest,
    sender_id: Uuid,
    dest_amount: i64,
    exchange_rate: Option<Decimal>,
    fee_currency: Option<Currency>,
    fee_amount: i64,
    now: DateTime<Utc>,
) -> Payment {
    Payment {
        id: Uuid::new_v4(),
        idempotency_key: req.idempotency_key.clone(),
        payment_type: PaymentType::ExternalPayout,
        status: PaymentStatus::Pending,
        source_account_id: sender_id,
        dest_account_id: None,
        dest_iban: Some(req.dest_iban.clone()),
        dest_bank_name: Some(req.dest_bank_name.clone()),
        source_amount: req.amount,
        source_currency: req.source_currency,
        dest_amount,
        dest_currency: req.dest_currency,
        exchange_rate,
        fee_amount,
        fee_currency,
        provider_ref: None,
        failure_reason: None,
        metadata: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    }
}

/// Submission failure is an operational concern, not a payment failure: the
/// row stays `pending` and can be resubmitted.
async fn submit_to_provider(state: &AppState, payment: &Payment) {
    let Some(provider) = &state.provider else {
        return;
    };

    if let Err(err) = provider.submit_payment(payment).await {
        tracing::warn!(
            payment_id = %payment.id,
            error = %err,
            "failed to submit to provider, payment stays pending"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payout_request() -> PayoutRequest {
        PayoutRequest {
            sender_user_id: Uuid::new_v4(),
            source_currency: Currency::Usd,
            dest_currency: Currency::Usd,
            amount: 5_000,
            dest_iban: "DE89370400440532013000".to_string(),
            dest_bank_name: "Deutsche Bank".to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
        }
    }

    fn stored_payment(req: &PayoutRequest, sender_account_id: Uuid) -> Payment {
        build_payment(req, sender_account_id, req.amount, None, None, 0, Utc::now())
    }

    #[test]
    fn replay_matches_identical_request() {
        let req = payout_request();
        let sender_account_id = Uuid::new_v4();
        let existing = stored_payment(&req, sender_account_id);
        assert!(payout_matches(&existing, &req, sender_account_id));
    }

    #[test]
    fn replay_rejects_changed_fields() {
        let req = payout_request();
        let sender_account_id = Uuid::new_v4();
        let existing = stored_payment(&req, sender_account_id);

        let mut changed_amount = req.clone();
        changed_amount.amount = 6_000;
        assert!(!payout_matches(&existing, &changed_amount, sender_account_id));

        let mut changed_currency = req.clone();
        changed_currency.dest_currency = Currency::Eur;
        assert!(!payout_matches(&existing, &changed_currency, sender_account_id));

        assert!(!payout_matches(&existing, &req, Uuid::new_v4()));
    }

    #[test]
    fn replay_rejects_other_payment_types() {
        let req = payout_request();
        let sender_account_id = Uuid::new_v4();
        let mut existing = stored_payment(&req, sender_account_id);
        existing.payment_type = PaymentType::InternalTransfer;
        assert!(!payout_matches(&existing, &req, sender_account_id));
    }

    #[test]
    fn pending_payment_carries_bank_details() {
        let req = payout_request();
        let payment = stored_payment(&req, Uuid::new_v4());
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.dest_iban.as_deref(), Some("DE89370400440532013000"));
        assert_eq!(payment.dest_bank_name.as_deref(), Some("Deutsche Bank"));
        assert!(payment.completed_at.is_none());
        assert!(payment.dest_account_id.is_none());
    }
}
