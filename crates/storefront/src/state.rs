//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::billing::BillingProvider;
use crate::config::StorefrontConfig;
use crate::services::cart::CartService;
use crate::services::orders::OrderService;
use crate::services::plans::PlanCache;
use crate::services::subscriptions::SubscriptionReconciler;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    billing: Arc<dyn BillingProvider>,
    plans: PlanCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `billing` - Billing provider client
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool, billing: Arc<dyn BillingProvider>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                billing,
                plans: PlanCache::new(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the billing provider.
    #[must_use]
    pub fn billing(&self) -> &dyn BillingProvider {
        self.inner.billing.as_ref()
    }

    /// Cart store over the shared pool.
    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(self.pool())
    }

    /// Order materializer over the shared pool.
    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.pool(), &self.inner.config.store)
    }

    /// Subscription reconciler over the shared pool and billing provider.
    #[must_use]
    pub fn reconciler(&self) -> SubscriptionReconciler<'_> {
        SubscriptionReconciler::new(
            self.pool(),
            self.billing(),
            &self.inner.plans,
            &self.inner.config.store,
            self.inner.config.billing.timeout,
        )
    }
}
