//! Internal transfer execution.
//!
//! A transfer settles synchronously inside one database transaction: lock the
//! touched accounts in ascending id order, re-verify status and balance under
//! lock, write the payment, its ledger legs, and the audit event, then
//! CAS-update every balance. Same-currency transfers move value directly;
//! cross-currency transfers route both legs through the system FX pools so
//! each currency's books balance on their own.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::account::{Account, AccountStatus, AccountType, Currency};
use crate::models::ledger::{EntryType, LedgerEntry};
use crate::models::payment::{Payment, PaymentEvent, PaymentEventType, PaymentStatus, PaymentType};
use crate::state::AppState;
use crate::store::{accounts, ledger, payment_events, payments, users};

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender_user_id: Uuid,
    pub recipient_unique_name: String,
    pub source_currency: Currency,
    pub dest_currency: Currency,
    pub amount: i64,
    pub idempotency_key: String,
}

/// Execute an internal transfer and return the completed payment.
pub async fn create_internal_transfer(
    state: &AppState,
    req: TransferRequest,
) -> Result<Payment, AppError> {
    let (sender, recipient) = resolve_transfer_accounts(state, &req).await?;

    validate_transfer(&req, &sender, &recipient, &state.config)?;

    let result = if req.source_currency == req.dest_currency {
        execute_same_currency(state, &req, sender.id, recipient.id).await
    } else {
        execute_cross_currency(state, &req, sender.id, recipient.id).await
    };

    let payment = result.map_err(|e| match e {
        // The unique index caught a concurrent submission with the same key.
        AppError::DuplicateIdempotencyKey => AppError::DuplicatePayment,
        other => other,
    })?;

    tracing::info!(
        payment_id = %payment.id,
        sender_account = %sender.id,
        recipient_account = %recipient.id,
        source_amount = req.amount,
        source_currency = %req.source_currency,
        dest_amount = payment.dest_amount,
        dest_currency = %req.dest_currency,
        "internal transfer completed"
    );

    Ok(payment)
}

/// Return the payment iff the source account belongs to the requester;
/// otherwise `NotFound`, so existence never leaks across tenants.
pub async fn get_payment_for_user(
    state: &AppState,
    payment_id: Uuid,
    user_id: Uuid,
) -> Result<Payment, AppError> {
    let payment = payments::get_by_id(&state.pool, payment_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let source = accounts::get_by_id(&state.pool, payment.source_account_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if source.user_id != user_id {
        return Err(AppError::NotFound);
    }

    Ok(payment)
}

async fn resolve_transfer_accounts(
    state: &AppState,
    req: &TransferRequest,
) -> Result<(Account, Account), AppError> {
    let recipient = users::get_by_unique_name(&state.pool, &req.recipient_unique_name)
        .await?
        .ok_or(AppError::RecipientNotFound)?;

    let recipient_account = accounts::get_by_user_and_currency(
        &state.pool,
        recipient.id,
        req.dest_currency,
        AccountType::User,
    )
    .await?
    .ok_or(AppError::AccountNotFound)?;

    let sender_account = accounts::get_by_user_and_currency(
        &state.pool,
        req.sender_user_id,
        req.source_currency,
        AccountType::User,
    )
    .await?
    .ok_or(AppError::AccountNotFound)?;

    Ok((sender_account, recipient_account))
}

fn validate_transfer(
    req: &TransferRequest,
    sender: &Account,
    recipient: &Account,
    config: &Config,
) -> Result<(), AppError> {
    if req.amount <= 0 {
        return Err(AppError::InvalidAmount);
    }

    // Same wallet to itself is a no-op; same user across currencies is the
    // supported conversion path.
    if sender.user_id == recipient.user_id && req.source_currency == req.dest_currency {
        return Err(AppError::SelfTransfer);
    }

    verify_active(sender)?;
    verify_active(recipient)?;

    if req.amount > config.tx_limit(req.source_currency) {
        return Err(AppError::LimitExceeded);
    }

    Ok(())
}

pub(crate) fn verify_active(account: &Account) -> Result<(), AppError> {
    match account.status {
        AccountStatus::Active => Ok(()),
        AccountStatus::Frozen => Err(AppError::AccountFrozen),
        _ => Err(AppError::AccountClosed),
    }
}

async fn execute_same_currency(
    state: &AppState,
    req: &TransferRequest,
    sender_id: Uuid,
    recipient_id: Uuid,
) -> Result<Payment, AppError> {
    let mut tx = state.pool.begin().await?;

    let locked = accounts::lock_in_order(&mut tx, &[sender_id, recipient_id]).await?;
    let sender = &locked[&sender_id];
    let recipient = &locked[&recipient_id];

    // Locked rows are authoritative; the pre-flight reads were advisory.
    verify_active(sender)?;
    verify_active(recipient)?;

    if sender.balance < req.amount {
        return Err(AppError::InsufficientFunds);
    }

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        idempotency_key: req.idempotency_key.clone(),
        payment_type: PaymentType::InternalTransfer,
        status: PaymentStatus::Completed,
        source_account_id: sender_id,
        dest_account_id: Some(recipient_id),
        dest_iban: None,
        dest_bank_name: None,
        source_amount: req.amount,
        source_currency: req.source_currency,
        dest_amount: req.amount,
        dest_currency: req.dest_currency,
        exchange_rate: None,
        fee_amount: 0,
        fee_currency: None,
        provider_ref: None,
        failure_reason: None,
        metadata: None,
        created_at: now,
        updated_at: now,
        completed_at: Some(now),
    };

    payments::create(&mut tx, &payment).await?;

    let legs = [
        plan_leg(sender, EntryType::Debit, req.amount, req.source_currency),
        plan_leg(recipient, EntryType::Credit, req.amount, req.dest_currency),
    ];
    apply_legs(&mut tx, payment.id, &legs, now).await?;

    write_payment_event(
        &mut tx,
        payment.id,
        PaymentEventType::Completed,
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
    req: &TransferRequest,
    sender_id: Uuid,
    recipient_id: Uuid,
) -> Result<Payment, AppError> {
    let conversion = state
        .fx
        .convert(req.amount, req.source_currency, req.dest_currency)?;

    let fx_pool_source =
        accounts::get_system_account(&state.pool, AccountType::FxPool, req.source_currency).await?;
    let fx_pool_dest =
        accounts::get_system_account(&state.pool, AccountType::FxPool, req.dest_currency).await?;

    let mut tx = state.pool.begin().await?;

    let locked = accounts::lock_in_order(
        &mut tx,
        &[sender_id, fx_pool_source.id, fx_pool_dest.id, recipient_id],
    )
    .await?;
    let sender = &locked[&sender_id];
    let recipient = &locked[&recipient_id];
    let fx_src = &locked[&fx_pool_source.id];
    let fx_dst = &locked[&fx_pool_dest.id];

    verify_active(sender)?;
    verify_active(recipient)?;

    if sender.balance < req.amount {
        return Err(AppError::InsufficientFunds);
    }
    if fx_dst.balance < conversion.dest_amount {
        return Err(AppError::InsufficientFunds);
    }

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        idempotency_key: req.idempotency_key.clone(),
        payment_type: PaymentType::InternalTransfer,
        status: PaymentStatus::Completed,
        source_account_id: sender_id,
        dest_account_id: Some(recipient_id),
        dest_iban: None,
        dest_bank_name: None,
        source_amount: req.amount,
        source_currency: req.source_currency,
        dest_amount: conversion.dest_amount,
        dest_currency: req.dest_currency,
        exchange_rate: Some(conversion.exchange_rate),
        fee_amount: conversion.fee_amount,
        fee_currency: Some(req.dest_currency),
        provider_ref: None,
        failure_reason: None,
        metadata: None,
        created_at: now,
        updated_at: now,
        completed_at: Some(now),
    };

    payments::create(&mut tx, &payment).await?;

    let legs = [
        plan_leg(sender, EntryType::Debit, req.amount, req.source_currency),
        plan_leg(fx_src, EntryType::Credit, req.amount, req.source_currency),
        plan_leg(fx_dst, EntryType::Debit, conversion.dest_amount, req.dest_currency),
        plan_leg(recipient, EntryType::Credit, conversion.dest_amount, req.dest_currency),
    ];
    apply_legs(&mut tx, payment.id, &legs, now).await?;

    write_payment_event(
        &mut tx,
        payment.id,
        PaymentEventType::Completed,
        &format!("user:{}", req.sender_user_id),
        None,
        now,
    )
    .await?;

    tx.commit().await?;

    Ok(payment)
}

/// One planned ledger leg with its balance snapshots and the version the
/// CAS update must land on.
#[derive(Debug, Clone)]
pub(crate) struct Leg {
    pub account_id: Uuid,
    pub entry_type: EntryType,
    pub amount: i64,
    pub currency: Currency,
    pub balance_before: i64,
    pub balance_after: i64,
    pub new_version: i64,
}

pub(crate) fn plan_leg(
    account: &Account,
    entry_type: EntryType,
    amount: i64,
    currency: Currency,
) -> Leg {
    let delta = match entry_type {
        EntryType::Credit => amount,
        EntryType::Debit => -amount,
    };
    Leg {
        account_id: account.id,
        entry_type,
        amount,
        currency,
        balance_before: account.balance,
        balance_after: account.balance + delta,
        new_version: account.version + 1,
    }
}

/// Persist each leg and move its account balance, in the given order.
pub(crate) async fn apply_legs(
    conn: &mut sqlx::PgConnection,
    payment_id: Uuid,
    legs: &[Leg],
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    for leg in legs {
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            payment_id,
            account_id: leg.account_id,
            entry_type: leg.entry_type,
            amount: leg.amount,
            currency: leg.currency,
            balance_before: leg.balance_before,
            balance_after: leg.balance_after,
            created_at: now,
        };
        ledger::create(conn, &entry).await?;
        accounts::update_balance(conn, leg.account_id, leg.balance_after, leg.new_version).await?;
    }
    Ok(())
}

pub(crate) async fn write_payment_event(
    conn: &mut sqlx::PgConnection,
    payment_id: Uuid,
    event_type: PaymentEventType,
    actor: &str,
    payload: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let event = PaymentEvent {
        id: Uuid::new_v4(),
        payment_id,
        event_type,
        actor: actor.to_string(),
        payload,
        created_at: now,
    };
    payment_events::create(conn, &event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn account(user_id: Uuid, currency: Currency) -> Account {
        Account {
            id: Uuid::new_v4(),
            user_id,
            currency,
            account_type: AccountType::User,
            balance: 100_000,
            version: 1,
            account_number: None,
            iban: None,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn request(amount: i64, source: Currency, dest: Currency) -> TransferRequest {
        TransferRequest {
            sender_user_id: Uuid::new_v4(),
            recipient_unique_name: "alice".to_string(),
            source_currency: source,
            dest_currency: dest,
            amount,
            idempotency_key: Uuid::new_v4().to_string(),
        }
    }

    #[test]
    fn validate_accepts_same_currency_transfer() {
        let cfg = test_config();
        let sender = account(Uuid::new_v4(), Currency::Usd);
        let recipient = account(Uuid::new_v4(), Currency::Usd);
        let req = request(5_000, Currency::Usd, Currency::Usd);
        assert!(validate_transfer(&req, &sender, &recipient, &cfg).is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_amounts() {
        let cfg = test_config();
        let sender = account(Uuid::new_v4(), Currency::Usd);
        let recipient = account(Uuid::new_v4(), Currency::Usd);
        for amount in [0, -100] {
            let req = request(amount, Currency::Usd, Currency::Usd);
            let err = validate_transfer(&req, &sender, &recipient, &cfg).unwrap_err();
            assert!(matches!(err, AppError::InvalidAmount));
        }
    }

    #[test]
    fn validate_enforces_per_currency_limit() {
        let cfg = test_config();
        let sender = account(Uuid::new_v4(), Currency::Usd);
        let recipient = account(Uuid::new_v4(), Currency::Usd);

        let at_limit = request(10_000_000, Currency::Usd, Currency::Usd);
        assert!(validate_transfer(&at_limit, &sender, &recipient, &cfg).is_ok());

        let over_limit = request(10_000_001, Currency::Usd, Currency::Usd);
        let err = validate_transfer(&over_limit, &sender, &recipient, &cfg).unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded));
    }

    #[test]
    fn validate_rejects_self_transfer_same_currency_only() {
        let cfg = test_config();
        let user = Uuid::new_v4();
        let sender = account(user, Currency::Usd);

        let same = account(user, Currency::Usd);
        let req = request(1_000, Currency::Usd, Currency::Usd);
        let err = validate_transfer(&req, &sender, &same, &cfg).unwrap_err();
        assert!(matches!(err, AppError::SelfTransfer));

        // Same user across currencies is the supported conversion path.
        let eur_wallet = account(user, Currency::Eur);
        let req = request(1_000, Currency::Usd, Currency::Eur);
        assert!(validate_transfer(&req, &sender, &eur_wallet, &cfg).is_ok());
    }

    #[test]
    fn validate_rejects_inactive_accounts() {
        let cfg = test_config();
        let req = request(1_000, Currency::Usd, Currency::Usd);

        let mut sender = account(Uuid::new_v4(), Currency::Usd);
        let recipient = account(Uuid::new_v4(), Currency::Usd);

        sender.status = AccountStatus::Frozen;
        let err = validate_transfer(&req, &sender, &recipient, &cfg).unwrap_err();
        assert!(matches!(err, AppError::AccountFrozen));

        sender.status = AccountStatus::Closed;
        let err = validate_transfer(&req, &sender, &recipient, &cfg).unwrap_err();
        assert!(matches!(err, AppError::AccountClosed));

        sender.status = AccountStatus::Active;
        let mut recipient = recipient;
        recipient.status = AccountStatus::Pending;
        let err = validate_transfer(&req, &sender, &recipient, &cfg).unwrap_err();
        assert!(matches!(err, AppError::AccountClosed));
    }

    #[test]
    fn plan_leg_snapshots_balances() {
        let mut acct = account(Uuid::new_v4(), Currency::Usd);
        acct.balance = 10_000;
        acct.version = 7;

        let debit = plan_leg(&acct, EntryType::Debit, 3_000, Currency::Usd);
        assert_eq!(debit.balance_before, 10_000);
        assert_eq!(debit.balance_after, 7_000);
        assert_eq!(debit.new_version, 8);

        let credit = plan_leg(&acct, EntryType::Credit, 3_000, Currency::Usd);
        assert_eq!(credit.balance_after, 13_000);
    }

    #[test]
    fn cross_currency_legs_balance_per_currency() {
        let sender = account(Uuid::new_v4(), Currency::Usd);
        let recipient = account(Uuid::new_v4(), Currency::Eur);
        let fx_usd = account(Uuid::new_v4(), Currency::Usd);
        let fx_eur = account(Uuid::new_v4(), Currency::Eur);

        let legs = [
            plan_leg(&sender, EntryType::Debit, 10_000, Currency::Usd),
            plan_leg(&fx_usd, EntryType::Credit, 10_000, Currency::Usd),
            plan_leg(&fx_eur, EntryType::Debit, 9_154, Currency::Eur),
            plan_leg(&recipient, EntryType::Credit, 9_154, Currency::Eur),
        ];

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
            assert_eq!(debits, credits, "{currency} books must balance");
        }

        for leg in &legs {
            let delta = match leg.entry_type {
                EntryType::Credit => leg.amount,
                EntryType::Debit => -leg.amount,
            };
            assert_eq!(leg.balance_after, leg.balance_before + delta);
        }
    }
}
