//! Subscription expiry sweep command.
//!
//! Runs the same sweep as `POST /subscriptions/sweep-expired`, for cron jobs
//! that can reach the database but not the HTTP endpoint.
//!
//! # Environment Variables
//!
//! The full storefront configuration (see `StorefrontConfig::from_env`).

use std::sync::Arc;

use chrono::Utc;

use aurora_storefront::billing::StripeClient;
use aurora_storefront::config::StorefrontConfig;
use aurora_storefront::state::AppState;

use super::{CommandError, connect};

/// Expire lapsed entitlements.
///
/// `batch_size` overrides `SWEEP_BATCH_SIZE`.
///
/// # Errors
///
/// Returns an error if configuration is invalid or a batch fails. Batches
/// that finished stay committed, so the command can simply be rerun.
pub async fn expired(batch_size: Option<i64>) -> Result<(), CommandError> {
    let config = StorefrontConfig::from_env().map_err(|e| CommandError::Other(e.to_string()))?;
    let pool = connect().await?;
    let billing =
        StripeClient::new(&config.billing).map_err(|e| CommandError::Other(e.to_string()))?;

    let batch_size = batch_size.unwrap_or(config.sweep.batch_size);
    let state = AppState::new(config, pool, Arc::new(billing));

    let report = state
        .reconciler()
        .sweep_expired(Utc::now(), batch_size)
        .await
        .map_err(|e| CommandError::Other(e.to_string()))?;

    tracing::info!("Sweep complete! Expired {} user(s)", report.count);
    for email in &report.emails {
        tracing::info!("  {email}");
    }
    Ok(())
}
