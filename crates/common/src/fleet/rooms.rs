//! Room creation and relay binding
//!
//! A room is bound to exactly one relay URL when it is created. Local-only
//! rooms bind to an online relay of the owning tenant; public rooms draw from
//! the shared relay pool. The URL is a snapshot: rooms never migrate.

use super::events::{FleetEvent, FleetEvents};
use super::liveness::LivenessTracker;
use crate::clock::SharedClock;
use crate::config::RoomConfig;
use crate::db::models::{Relay, Room};
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use rand::seq::SliceRandom;
use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

const MAX_ROOM_NAME_LEN: usize = 128;

/// Which relay a local-only room should bind to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelaySelection {
    /// First online tenant relay by name
    #[default]
    Auto,
    /// This relay, which must be online and owned by the tenant
    Relay(Uuid),
}

/// Parameters for [`RoomBinder::create_room`]
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub tenant_id: Uuid,
    pub name: String,
    pub is_local_only: bool,
    pub relay: RelaySelection,
    pub ice_config: Option<Value>,
}

/// Binds rooms to relays
#[derive(Clone)]
pub struct RoomBinder {
    repo: Repository,
    liveness: LivenessTracker,
    events: FleetEvents,
    clock: SharedClock,
    config: RoomConfig,
    max_relay_wait: Duration,
}

impl RoomBinder {
    pub fn new(
        repo: Repository,
        liveness: LivenessTracker,
        events: FleetEvents,
        clock: SharedClock,
        config: RoomConfig,
        max_relay_wait: Duration,
    ) -> Self {
        Self {
            repo,
            liveness,
            events,
            clock,
            config,
            max_relay_wait,
        }
    }

    /// Create a room and bind it to a relay URL
    pub async fn create_room(&self, new_room: NewRoom) -> Result<Room> {
        let name = new_room.name.trim();
        if name.is_empty() || name.len() > MAX_ROOM_NAME_LEN {
            return Err(AppError::invalid_field(
                "name",
                format!("Room name must be 1-{} characters", MAX_ROOM_NAME_LEN),
            ));
        }

        let ice_config = self.resolve_ice_config(new_room.ice_config)?;

        let relay_url = if new_room.is_local_only {
            let relay = self.select_local_relay(new_room.tenant_id, new_room.relay).await?;
            relay.url.ok_or_else(|| AppError::Internal {
                message: format!("Online relay {} has no registered URL", relay.id),
            })?
        } else {
            if let RelaySelection::Relay(_) = new_room.relay {
                return Err(AppError::invalid_field(
                    "relay_id",
                    "A relay can only be chosen for local-only rooms",
                ));
            }
            self.pick_shared_relay()?
        };

        let room = self
            .repo
            .create_room(
                new_room.tenant_id,
                name.to_string(),
                slugify(name),
                new_room.is_local_only,
                relay_url,
                ice_config,
                self.clock.now(),
            )
            .await?;

        metrics::record_room_created(room.is_local_only);
        tracing::info!(
            tenant_id = %room.tenant_id,
            room_id = %room.id,
            slug = %room.slug,
            relay_url = %room.relay_url,
            local_only = room.is_local_only,
            "Room created"
        );
        Ok(room)
    }

    async fn select_local_relay(&self, tenant_id: Uuid, selection: RelaySelection) -> Result<Relay> {
        let online = self.liveness.list_online(Some(tenant_id)).await?;

        let chosen = match selection {
            RelaySelection::Auto => online.into_iter().next(),
            RelaySelection::Relay(id) => online.into_iter().find(|relay| relay.id == id),
        };

        chosen.ok_or_else(|| {
            AppError::invalid_field("relay_id", "No online relay available for a local-only room")
        })
    }

    fn pick_shared_relay(&self) -> Result<String> {
        self.config
            .shared_relay_urls
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| AppError::ServiceUnavailable {
                message: "No shared relays are configured".to_string(),
            })
    }

    fn resolve_ice_config(&self, requested: Option<Value>) -> Result<Value> {
        let value = match requested {
            Some(value) => value,
            None => serde_json::from_str(&self.config.default_ice_config).map_err(|e| {
                AppError::Configuration {
                    message: format!("rooms.default_ice_config is not valid JSON: {}", e),
                }
            })?,
        };

        if !(value.is_object() || value.is_array()) {
            return Err(AppError::invalid_field(
                "ice_config",
                "ice_config must be a JSON object or array",
            ));
        }
        Ok(value)
    }

    /// Wait for an online relay of `tenant_id`, for at most `timeout` (capped
    /// by the configured maximum).
    ///
    /// Returns `None` on timeout. Signals only trigger a re-read of the store,
    /// so a missed or lagged signal costs latency, never correctness.
    pub async fn await_local_relay(&self, tenant_id: Uuid, timeout: Duration) -> Result<Option<Relay>> {
        // Subscribe before the first read so a registration in between is seen
        let mut rx = self.events.subscribe();
        let deadline = tokio::time::Instant::now() + timeout.min(self.max_relay_wait);

        loop {
            if let Some(relay) = self.liveness.list_online(Some(tenant_id)).await?.into_iter().next() {
                return Ok(Some(relay));
            }

            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Err(_) => return Ok(None),
                    Ok(Ok(FleetEvent::RelayOnline { tenant_id: t, .. })) if t == tenant_id => break,
                    Ok(Ok(_)) => continue,
                    Ok(Err(RecvError::Lagged(skipped))) => {
                        tracing::debug!(skipped, "Fleet event receiver lagged");
                        break;
                    }
                    Ok(Err(RecvError::Closed)) => return Ok(None),
                }
            }
        }
    }

    /// One room of a tenant. Rooms of other tenants are reported as missing.
    pub async fn get_room(&self, tenant_id: Uuid, room_id: Uuid) -> Result<Room> {
        find_tenant_room(&self.repo, tenant_id, room_id).await
    }

    pub async fn list_rooms(&self, tenant_id: Uuid) -> Result<Vec<Room>> {
        self.repo.list_rooms(tenant_id).await
    }
}

pub(crate) async fn find_tenant_room(repo: &Repository, tenant_id: Uuid, room_id: Uuid) -> Result<Room> {
    match repo.find_room_by_id(room_id).await? {
        Some(room) if room.tenant_id == tenant_id => Ok(room),
        _ => Err(AppError::RoomNotFound {
            id: room_id.to_string(),
        }),
    }
}

fn slug_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// `"Sunday Service (EN)"` becomes `sunday-service-en-3fa9c1`
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = slug_separator().replace_all(&lowered, "-");
    let base = collapsed.trim_matches('-');
    let base = if base.is_empty() { "room" } else { base };

    let suffix: [u8; 3] = rand::random();
    format!("{}-{}", base, hex::encode(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        let slug = slugify("Sunday Service (EN)");
        let (base, suffix) = slug.rsplit_once('-').unwrap();
        assert_eq!(base, "sunday-service-en");
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(slugify("!!!").starts_with("room-"));
        assert_ne!(slugify("main"), slugify("main"));
    }
}

#[cfg(test)]
mod binding_tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::fleet::testing::{Harness, SHARED_RELAY};
    use serde_json::json;

    fn new_room(tenant_id: Uuid, name: &str, is_local_only: bool) -> NewRoom {
        NewRoom {
            tenant_id,
            name: name.to_string(),
            is_local_only,
            relay: RelaySelection::Auto,
            ice_config: None,
        }
    }

    #[tokio::test]
    async fn test_public_room_uses_shared_pool() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;

        let room = h.fleet.rooms.create_room(new_room(tenant.id, "Main Hall", false)).await.unwrap();
        assert_eq!(room.relay_url, SHARED_RELAY);
        assert!(!room.is_local_only);
        assert!(room.slug.starts_with("main-hall-"));
        assert_eq!(room.ice_config["iceServers"][0]["urls"][0], "stun:stun.l.google.com:19302");
    }

    #[tokio::test]
    async fn test_public_room_without_pool_unavailable() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;
        let mut config = AppConfig::default();
        config.rooms.shared_relay_urls.clear();
        let binder = RoomBinder::new(
            h.repo.clone(),
            h.fleet.liveness.clone(),
            h.fleet.events.clone(),
            std::sync::Arc::new(h.clock.clone()),
            config.rooms,
            Duration::from_secs(1),
        );

        let err = binder.create_room(new_room(tenant.id, "Main", false)).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_local_room_binds_online_tenant_relay() {
        let h = Harness::new().await;
        let acme = h.tenant("acme").await;
        let globex = h.tenant("globex").await;
        h.online_relay(&globex, "edge-0").await;
        h.online_relay(&acme, "edge-2").await;
        h.online_relay(&acme, "edge-1").await;

        let room = h.fleet.rooms.create_room(new_room(acme.id, "Local", true)).await.unwrap();
        assert!(room.is_local_only);
        assert_eq!(room.relay_url, "wss://edge1:4443");
    }

    #[tokio::test]
    async fn test_local_room_with_explicit_relay() {
        let h = Harness::new().await;
        let acme = h.tenant("acme").await;
        let globex = h.tenant("globex").await;
        h.online_relay(&acme, "edge-1").await;
        let second = h.online_relay(&acme, "edge-2").await;
        let foreign = h.online_relay(&globex, "edge-3").await;

        let mut request = new_room(acme.id, "Pinned", true);
        request.relay = RelaySelection::Relay(second.id);
        let room = h.fleet.rooms.create_room(request).await.unwrap();
        assert_eq!(room.relay_url, "wss://edge2:4443");

        let mut request = new_room(acme.id, "Foreign", true);
        request.relay = RelaySelection::Relay(foreign.id);
        let err = h.fleet.rooms.create_room(request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let mut request = new_room(acme.id, "Public pinned", false);
        request.relay = RelaySelection::Relay(second.id);
        let err = h.fleet.rooms.create_room(request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_local_room_with_offline_relay_rejected() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;

        let err = h.fleet.rooms.create_room(new_room(tenant.id, "Empty", true)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        h.online_relay(&tenant, "edge-1").await;
        h.advance_secs(121);
        let err = h.fleet.rooms.create_room(new_room(tenant.id, "Stale", true)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(h.fleet.rooms.list_rooms(tenant.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ice_config_validation() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;

        let mut request = new_room(tenant.id, "Custom", false);
        request.ice_config = Some(json!([{"urls": ["turn:turn.example:3478"]}]));
        let room = h.fleet.rooms.create_room(request).await.unwrap();
        assert!(room.ice_config.is_array());

        let mut request = new_room(tenant.id, "Scalar", false);
        request.ice_config = Some(json!("stun:stun.example"));
        let err = h.fleet.rooms.create_room(request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "ice_config"));
    }

    #[tokio::test]
    async fn test_duplicate_room_name_conflicts() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;
        h.fleet.rooms.create_room(new_room(tenant.id, "Main", false)).await.unwrap();

        let err = h.fleet.rooms.create_room(new_room(tenant.id, "Main", false)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_get_room_hides_other_tenants() {
        let h = Harness::new().await;
        let acme = h.tenant("acme").await;
        let globex = h.tenant("globex").await;
        let room = h.fleet.rooms.create_room(new_room(acme.id, "Main", false)).await.unwrap();

        assert_eq!(h.fleet.rooms.get_room(acme.id, room.id).await.unwrap().id, room.id);
        let err = h.fleet.rooms.get_room(globex.id, room.id).await.unwrap_err();
        assert!(matches!(err, AppError::RoomNotFound { .. }));
        assert!(h.fleet.rooms.list_rooms(globex.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_await_local_relay() {
        let h = Harness::new().await;
        let tenant = h.tenant("acme").await;

        let none = h
            .fleet
            .rooms
            .await_local_relay(tenant.id, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(none.is_none());

        let key = "rk_waiting_0123456789";
        h.fleet.relays.issue_key(tenant.id, key).await.unwrap();

        let rooms = h.fleet.rooms.clone();
        let tenant_id = tenant.id;
        let waiter = tokio::spawn(async move { rooms.await_local_relay(tenant_id, Duration::from_secs(10)).await });

        tokio::task::yield_now().await;
        h.fleet
            .relays
            .register(&Harness::registration(key, "edge-1"))
            .await
            .unwrap();

        let relay = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(relay.name.as_deref(), Some("edge-1"));
    }
}
