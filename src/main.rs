//! Payment Service - Main Application Entry Point
//!
//! A multi-currency payment processing backend: user wallets in USD/EUR/GBP,
//! synchronous internal transfers (same- and cross-currency through system FX
//! pools), and asynchronous external bank payouts reconciled via signed
//! provider webhooks. Every movement of value is double-entry ledgered under
//! row locks, version CAS, and a non-negative balance constraint.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, migrations)
//! - **Authentication**: bearer tokens stored as SHA-256 hashes
//! - **Background work**: a single cooperative webhook-processor loop
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Spawn the webhook processor
//! 4. Build the HTTP router with auth + idempotency middleware
//! 5. Serve until SIGINT/SIGTERM, then drain and stop the processor

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod response;
mod services;
mod state;
mod store;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::services::fx::RateService;
use crate::services::provider::ProviderClient;
use crate::services::webhook_processor::WebhookProcessor;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info".
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(config::Config::from_env()?);
    tracing::info!("configuration loaded");

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("database migrations complete");

    let provider = ProviderClient::new(&config.provider_url, &config.webhook_callback_url)?;

    let state = AppState {
        pool,
        config: config.clone(),
        fx: Arc::new(RateService::new(config.fx_spread_pct)),
        provider: Some(Arc::new(provider)),
    };

    // One channel drives the whole shutdown sequence: the processor finishes
    // its in-flight iteration, and the server stops accepting and drains.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let processor = WebhookProcessor::new(state.clone());
    let processor_handle = tokio::spawn(processor.run(shutdown_rx));

    // Mutating routes sit behind auth first, then the idempotency cache.
    let authenticated_routes = Router::new()
        .route("/api/v1/accounts", post(handlers::accounts::create_account))
        .route("/api/v1/accounts", get(handlers::accounts::list_accounts))
        .route("/api/v1/payments", post(handlers::payments::create_transfer))
        .route(
            "/api/v1/payments/external",
            post(handlers::payments::create_payout),
        )
        .route(
            "/api/v1/payments/{id}",
            get(handlers::payments::get_payment),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::idempotency::idempotency_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let app = Router::new()
        // Public routes: health, FX quotes, and the provider callback (it
        // authenticates itself with an HMAC signature over at most 1 MiB).
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/fx/rate", get(handlers::fx::get_rate))
        .route(
            "/api/v1/webhooks/provider",
            post(handlers::webhooks::receive_provider_webhook)
                .layer(DefaultBodyLimit::max(1024 * 1024)),
        )
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("server listening on {}", addr);

    // Flip the channel when the OS asks us to stop. From that moment the
    // listener stops accepting, the processor winds down, and the drain
    // deadline starts counting.
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    };

    let drain_deadline = Duration::from_secs(config.shutdown_timeout_secs);

    // Drain in-flight requests up to the deadline. The deadline only starts
    // once the shutdown signal has fired, and a stalled connection cannot
    // hold the process open past it: losing the race drops the server and
    // with it every remaining connection.
    let mut deadline_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = server => {
            result?;
        }
        _ = async {
            let _ = deadline_rx.changed().await;
            tokio::time::sleep(drain_deadline).await;
        } => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "drain deadline reached, closing remaining connections"
            );
        }
    }

    // Covers the case where the server exited on its own (bind/accept
    // error) without a signal ever firing.
    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(drain_deadline, processor_handle)
        .await
        .is_err()
    {
        tracing::warn!("webhook processor did not stop before the drain deadline");
    }

    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
