//! Heartbeat ingestion and read-time liveness
//!
//! There is no sweeper. A relay is online exactly when its last heartbeat is
//! within the staleness window at the moment someone asks, which makes the
//! stored `status` column a lagging hint. Anything that needs to know whether
//! a relay is reachable goes through [`LivenessTracker::list_online`].

use crate::clock::SharedClock;
use crate::db::models::{Relay, RelayStatus};
use crate::db::Repository;
use crate::errors::Result;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Whether a heartbeat stamped at `last_heartbeat` still counts at `now`.
///
/// Live when `last_heartbeat >= now - window`. A heartbeat stamped after
/// `now` (clock skew between writers) counts as live.
pub fn is_live(last_heartbeat: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(last) = last_heartbeat else {
        return false;
    };

    match now.signed_duration_since(last).to_std() {
        Ok(elapsed) => elapsed <= window,
        Err(_) => true,
    }
}

/// Liveness derived from the heartbeat, never from the status column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Key issued, never registered
    Pending,
    Online,
    Offline,
}

impl Liveness {
    pub fn derive(relay: &Relay, now: DateTime<Utc>, window: Duration) -> Self {
        if !relay.is_registered() {
            Liveness::Pending
        } else if is_live(relay.last_heartbeat, now, window) {
            Liveness::Online
        } else {
            Liveness::Offline
        }
    }

    fn matches(self, stored: RelayStatus) -> bool {
        matches!(
            (self, stored),
            (Liveness::Pending, RelayStatus::Pending)
                | (Liveness::Online, RelayStatus::Online)
                | (Liveness::Offline, RelayStatus::Offline)
        )
    }
}

/// The stored status column disagrees with the heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StalenessWarning {
    pub stored: RelayStatus,
    pub derived: Liveness,
}

/// A relay with its recomputed liveness
#[derive(Debug, Clone)]
pub struct RelayHealth {
    pub relay: Relay,
    pub liveness: Liveness,
    pub warning: Option<StalenessWarning>,
}

/// Ingests heartbeats and answers "which relays are reachable right now"
#[derive(Clone)]
pub struct LivenessTracker {
    repo: Repository,
    clock: SharedClock,
    stale_window: Duration,
}

impl LivenessTracker {
    pub fn new(repo: Repository, clock: SharedClock, stale_window: Duration) -> Self {
        Self {
            repo,
            clock,
            stale_window,
        }
    }

    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    /// Refresh a relay's heartbeat.
    ///
    /// Returns `false` when the relay is unknown or has never registered; the
    /// relay should then fall back to a full registration.
    pub async fn heartbeat(&self, relay_id: Uuid) -> Result<bool> {
        let known = self.repo.record_heartbeat(relay_id, self.clock.now()).await?;

        metrics::record_heartbeat(known);
        if known {
            tracing::debug!(relay_id = %relay_id, "Heartbeat accepted");
        } else {
            tracing::info!(relay_id = %relay_id, "Heartbeat for unknown relay, re-registration required");
        }

        Ok(known)
    }

    /// Relays whose heartbeat is inside the staleness window, optionally for a
    /// single tenant, ordered by name ascending
    pub async fn list_online(&self, tenant_id: Option<Uuid>) -> Result<Vec<Relay>> {
        let now = self.clock.now();
        let relays = self.repo.list_relays(tenant_id).await?;

        let online: Vec<Relay> = relays
            .into_iter()
            .filter(|relay| {
                let live = relay.is_registered() && is_live(relay.last_heartbeat, now, self.stale_window);
                if !live && relay.stored_status() == RelayStatus::Online {
                    tracing::debug!(relay_id = %relay.id, "Stored status online but heartbeat is stale");
                }
                live
            })
            .collect();

        metrics::record_online_relays(online.len());
        Ok(online)
    }

    /// Every relay of a tenant with recomputed liveness and a warning where the
    /// stored status lags behind
    pub async fn relay_health(&self, tenant_id: Uuid) -> Result<Vec<RelayHealth>> {
        let now = self.clock.now();
        let relays = self.repo.list_relays(Some(tenant_id)).await?;

        Ok(relays
            .into_iter()
            .map(|relay| {
                let liveness = Liveness::derive(&relay, now, self.stale_window);
                let stored = relay.stored_status();
                let warning = (!liveness.matches(stored)).then_some(StalenessWarning {
                    stored,
                    derived: liveness,
                });
                RelayHealth {
                    relay,
                    liveness,
                    warning,
                }
            })
            .collect())
    }
}


#[cfg(test)]
mod tracker_tests {
    use super::*;
    use crate::fleet::testing::Harness;

    #[tokio::test]
    async fn test_heartbeat_unknown_or_pending_returns_false() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;
        assert!(!h.fleet.liveness.heartbeat(Uuid::new_v4()).await.unwrap());

        let pending = h
            .fleet
            .relays
            .issue_key(tenant.id, "rk_pending_0123456789")
            .await
            .unwrap();
        assert!(!h.fleet.liveness.heartbeat(pending.id).await.unwrap());
        let stored = h.repo.find_relay_by_id(pending.id).await.unwrap().unwrap();
        assert!(stored.last_heartbeat.is_none());
        assert_eq!(stored.stored_status(), RelayStatus::Pending);
    }

    #[tokio::test]
    async fn test_heartbeat_advances_and_keeps_tenant() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;
        let relay = h.online_relay(&tenant, "edge-1").await;

        let mut previous = relay.last_heartbeat;
        for _ in 0..3 {
            h.advance_secs(30);
            assert!(h.fleet.liveness.heartbeat(relay.id).await.unwrap());
            let stored = h.repo.find_relay_by_id(relay.id).await.unwrap().unwrap();
            assert!(stored.last_heartbeat > previous);
            assert_eq!(stored.tenant_id, tenant.id);
            previous = stored.last_heartbeat;
        }
    }

    #[tokio::test]
    async fn test_heartbeat_never_moves_backwards() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;
        let relay = h.online_relay(&tenant, "edge-1").await;

        h.advance_secs(-60);
        assert!(h.fleet.liveness.heartbeat(relay.id).await.unwrap());
        let stored = h.repo.find_relay_by_id(relay.id).await.unwrap().unwrap();
        assert_eq!(stored.last_heartbeat, relay.last_heartbeat);
    }

    #[tokio::test]
    async fn test_list_online_filters_stale_and_orders_by_name() {
        let h = Harness::new().await;
        let acme = h.tenant("acme").await;
        let globex = h.tenant("globex").await;

        let stale = h.online_relay(&acme, "edge-0").await;
        h.advance_secs(100);
        h.online_relay(&acme, "edge-2").await;
        h.online_relay(&acme, "edge-1").await;
        h.online_relay(&globex, "edge-9").await;
        h.advance_secs(30);

        // edge-0 still says online in the store but its heartbeat is 130s old
        let stored = h.repo.find_relay_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(stored.stored_status(), RelayStatus::Online);

        let names: Vec<_> = h
            .fleet
            .liveness
            .list_online(Some(acme.id))
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["edge-1", "edge-2"]);

        assert_eq!(h.fleet.liveness.list_online(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_relay_health_reports_lagging_status() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;
        h.fleet
            .relays
            .issue_key(tenant.id, "rk_pending_0123456789")
            .await
            .unwrap();
        let relay = h.online_relay(&tenant, "edge-1").await;
        h.advance_secs(200);

        let health = h.fleet.liveness.relay_health(tenant.id).await.unwrap();
        assert_eq!(health.len(), 2);

        let pending = health.iter().find(|r| !r.relay.is_registered()).unwrap();
        assert_eq!(pending.liveness, Liveness::Pending);
        assert!(pending.warning.is_none());

        let edge = health.iter().find(|r| r.relay.id == relay.id).unwrap();
        assert_eq!(edge.liveness, Liveness::Offline);
        assert_eq!(
            edge.warning,
            Some(StalenessWarning {
                stored: RelayStatus::Online,
                derived: Liveness::Offline,
            })
        );
    }
}
