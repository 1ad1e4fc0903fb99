//! Cached plan lookup.

use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use aurora_core::{PlanId, ProPlan};

use crate::config::StoreConfig;
use crate::db::{PlanRepository, RepositoryError};

/// Plan rows are effectively static; ids are cached by plan code.
const PLAN_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache of plan ids keyed by plan code.
///
/// Plans are written in their own statement on a pooled connection, never
/// inside a caller's transaction, so a cached id always refers to a
/// committed row.
#[derive(Clone)]
pub struct PlanCache {
    cache: Cache<&'static str, PlanId>,
}

impl PlanCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(PLAN_CACHE_TTL)
                .build(),
        }
    }

    /// Get-or-create the plan row for `plan`, priced from store configuration.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the plan cannot be written.
    pub async fn plan_id(
        &self,
        pool: &PgPool,
        plan: ProPlan,
        store: &StoreConfig,
    ) -> Result<PlanId, RepositoryError> {
        let code = plan.plan_code();
        if let Some(plan_id) = self.cache.get(code).await {
            return Ok(plan_id);
        }

        let mut conn = pool.acquire().await?;
        let plan_id = PlanRepository::new(&mut conn)
            .get_or_create(code, store.plan_price(plan), &store.currency, plan.interval())
            .await?;

        self.cache.insert(code, plan_id).await;
        Ok(plan_id)
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new()
    }
}
