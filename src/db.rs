//! Database connection pool and migration management.
//!
//! This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running database migrations automatically at startup

use sqlx::{Pool, Postgres};

/// Type alias for the PostgreSQL connection pool.
///
/// Instead of writing `Pool<Postgres>` everywhere, we can use `DbPool`.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// A connection pool maintains multiple database connections that are reused
/// across HTTP requests and the webhook processor, which is much more
/// efficient than opening a new connection for each operation.
///
/// # Arguments
///
/// * `database_url` - PostgreSQL connection string
/// * `max_connections` - pool cap, from `DB_MAX_CONNECTIONS`
///
/// # Configuration
///
/// - Connections are created lazily as needed
/// - Idle connections are kept alive for reuse
///
/// # Errors
///
/// Returns an error if:
/// - The connection string is invalid
/// - The PostgreSQL server cannot be reached
/// - Database authentication fails
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        // Limit concurrent connections
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// This function executes all SQL migration files in order. Migrations are
/// tracked in a special `_sqlx_migrations` table, so each migration runs
/// only once.
///
/// # Migration Files
///
/// Migration files must be in the `migrations/` directory with format:
/// - `<timestamp>_<name>.sql` (e.g., `20250601000001_initial.sql`)
///
/// # Errors
///
/// Returns an error if:
/// - A previously applied migration was modified on disk
/// - SQL errors occur during migration execution
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations
    sqlx::migrate!("./migrations").run(pool).await
}
