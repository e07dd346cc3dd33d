//! Shared application state

use crate::middleware::rate_limit::{create_rate_limiter, RelayRateLimiter};
use airwave_common::{
    auth::{AdminGuard, CredentialHasher},
    clock::SharedClock,
    config::AppConfig,
    db::DbPool,
    errors::Result,
    fleet::Fleet,
    Repository,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub fleet: Fleet,
    pub admin: AdminGuard,
    pub relay_limiter: RelayRateLimiter,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire every service to one store and clock
    pub fn new(
        config: AppConfig,
        db: DbPool,
        clock: SharedClock,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let hasher = CredentialHasher::new(&config.auth.hashing)?;
        let admin = AdminGuard::new(hasher.clone(), config.auth.admin_token.as_deref())?;
        let relay_limiter = create_rate_limiter(&config.rate_limit)?;
        let fleet = Fleet::new(Repository::new(db.clone()), hasher, clock, &config);

        Ok(Self {
            config: Arc::new(config),
            db,
            fleet,
            admin,
            relay_limiter,
            metrics,
        })
    }

    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.config.fleet.heartbeat_interval_secs
    }
}
