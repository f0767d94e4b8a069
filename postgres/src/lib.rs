//! `PostgreSQL` storage for workshop check-in.
//!
//! Provides [`PostgresCheckInStore`] (registrations and the per-workshop
//! attendee counter) and [`PostgresDirectory`] (read-only lookup of known
//! people). Queries are built at runtime with `sqlx::query`, so the crate
//! compiles without a live database.
//!
//! Concurrency guarantees come from the database:
//!
//! - each unit of work locks its workshop row for the whole transaction
//! - `code` is unique across all registrations
//! - at most one non-cancelled registration per `(workshop_id, user_id)`
//!
//! # Example
//!
//! ```no_run
//! use checkin_postgres::{connect, migrate, PostgresCheckInStore, PostgresDirectory};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/checkin", 10, Duration::from_secs(5)).await?;
//! migrate(&pool).await?;
//!
//! let store = PostgresCheckInStore::new(pool.clone());
//! let directory = PostgresDirectory::new(pool);
//! # let _ = (store, directory);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use checkin_core::error::{CheckInError, Result};
use sqlx::postgres::PgPoolOptions;

mod directory;
mod rows;
mod store;

pub use directory::PostgresDirectory;
pub use sqlx::PgPool;
pub use store::{PostgresCheckInStore, PostgresUnit};

/// Open a connection pool.
///
/// # Errors
///
/// Returns `CheckInError::Storage` if the database cannot be reached within
/// `connect_timeout`.
pub async fn connect(url: &str, max_connections: u32, connect_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect(url)
        .await
        .map_err(|e| CheckInError::Storage(format!("Failed to connect to database: {e}")))?;

    tracing::info!(max_connections, "Database pool ready");
    Ok(pool)
}

/// Apply the bundled schema migrations.
///
/// # Errors
///
/// Returns `CheckInError::Storage` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CheckInError::Storage(format!("Failed to run migrations: {e}")))?;

    tracing::info!("Database migrations applied");
    Ok(())
}
