//! Relay fleet core
//!
//! Tenants own relays and rooms. Relays are admitted by key, kept alive by
//! heartbeats and considered online only while their last heartbeat is inside
//! the staleness window. Rooms snapshot the URL of the relay they bind to.
//!
//! All durable state lives in the store; the services here hold no mutable
//! state of their own and are cheap to clone.

mod events;
mod liveness;
mod publishers;
mod relays;
mod rooms;
mod tenants;

pub use events::{FleetEvent, FleetEvents};
pub use liveness::{is_live, Liveness, LivenessTracker, RelayHealth, StalenessWarning};
pub use publishers::{JoinGrant, PublisherRegistry};
pub use relays::{RelayRegistry, MIN_RELAY_KEY_LEN};
pub use rooms::{slugify, NewRoom, RelaySelection, RoomBinder};
pub use tenants::TenantDirectory;

use crate::auth::CredentialHasher;
use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::db::Repository;

/// Every fleet service wired to one store, clock and event channel
#[derive(Clone)]
pub struct Fleet {
    pub tenants: TenantDirectory,
    pub relays: RelayRegistry,
    pub liveness: LivenessTracker,
    pub rooms: RoomBinder,
    pub publishers: PublisherRegistry,
    pub events: FleetEvents,
}

impl Fleet {
    pub fn new(repo: Repository, hasher: CredentialHasher, clock: SharedClock, config: &AppConfig) -> Self {
        let events = FleetEvents::new();
        let liveness = LivenessTracker::new(repo.clone(), clock.clone(), config.fleet.stale_window());

        Self {
            tenants: TenantDirectory::new(repo.clone(), hasher.clone(), clock.clone()),
            relays: RelayRegistry::new(repo.clone(), hasher.clone(), clock.clone(), events.clone()),
            rooms: RoomBinder::new(
                repo.clone(),
                liveness.clone(),
                events.clone(),
                clock.clone(),
                config.rooms.clone(),
                config.fleet.max_relay_wait(),
            ),
            publishers: PublisherRegistry::new(repo, hasher, clock),
            liveness,
            events,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::HashingConfig;
    use crate::db::models::{Relay, Tenant};
    use crate::wire::RelayRegistration;
    use crate::{DbPool, ManualClock};
    use std::sync::Arc;

    pub const SHARED_RELAY: &str = "wss://pool-1.airwave.example:443";

    /// Fleet on an in-memory store with a hand-driven clock
    pub struct Harness {
        pub fleet: Fleet,
        pub repo: Repository,
        pub clock: ManualClock,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self::with_config(AppConfig::default()).await
        }

        pub async fn with_config(config: AppConfig) -> Self {
            Self::with_store(config, DbPool::in_memory().await.unwrap())
        }

        pub fn with_store(mut config: AppConfig, pool: DbPool) -> Self {
            if config.rooms.shared_relay_urls.is_empty() {
                config.rooms.shared_relay_urls = vec![SHARED_RELAY.to_string()];
            }
            let repo = Repository::new(pool);
            let hasher = CredentialHasher::new(&HashingConfig::insecure_fast()).unwrap();
            let clock = ManualClock::default();
            let fleet = Fleet::new(repo.clone(), hasher, Arc::new(clock.clone()), &config);
            Self { fleet, repo, clock }
        }

        pub async fn tenant(&self, name: &str) -> Tenant {
            self.fleet.tenants.create_tenant(name).await.unwrap().0
        }

        pub fn registration(key: &str, name: &str) -> RelayRegistration {
            RelayRegistration {
                secret_key: key.to_string(),
                name: name.to_string(),
                url: format!("wss://{}:4443", name.replace('-', "")),
                announced_ip: "203.0.113.7".to_string(),
                port: 40000,
            }
        }

        /// Issue a key for `tenant` and register a relay called `name` with it
        pub async fn online_relay(&self, tenant: &Tenant, name: &str) -> Relay {
            let key = format!("rk_{}_{}_0123456789", tenant.name, name);
            self.fleet.relays.issue_key(tenant.id, &key).await.unwrap();
            self.fleet
                .relays
                .register(&Self::registration(&key, name))
                .await
                .unwrap()
        }

        pub fn advance_secs(&self, secs: i64) {
            self.clock.advance(chrono::Duration::seconds(secs));
        }
    }
}
