//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! aurora-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for storefront
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded in the
//! storefront crate, so the CLI always applies the set the server was built with.

use aurora_storefront::db::MIGRATOR;

use super::{CommandError, connect};

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn storefront() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!(migrations = MIGRATOR.iter().count(), "Running storefront migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
