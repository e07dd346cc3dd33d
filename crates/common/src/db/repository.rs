//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling. Writes that race are single conditional
//! statements so no connection holds a lock it later has to upgrade.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

/// Network identity a relay presents when it registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayIdentity {
    pub name: String,
    pub url: String,
    pub announced_ip: String,
    pub port: u16,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Tenant Operations
    // ========================================================================

    /// Insert a tenant. A duplicate name surfaces as a conflict.
    pub async fn create_tenant(
        &self,
        name: String,
        api_key_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Tenant> {
        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            api_key_hash: Set(api_key_hash),
            created_at: Set(now),
        };

        tenant.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find tenant by ID
    pub async fn find_tenant_by_id(&self, id: Uuid) -> Result<Option<Tenant>> {
        TenantEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Every tenant with its key hash, for credential scans
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        TenantEntity::find()
            .order_by_asc(TenantColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Replace a tenant's key hash
    pub async fn update_tenant_key_hash(&self, id: Uuid, api_key_hash: String) -> Result<bool> {
        let result = TenantEntity::update_many()
            .col_expr(TenantColumn::ApiKeyHash, Expr::value(api_key_hash))
            .filter(TenantColumn::Id.eq(id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Relay Operations
    // ========================================================================

    /// Insert a pending relay with no network identity
    pub async fn create_pending_relay(
        &self,
        tenant_id: Uuid,
        secret_key: String,
        secret_key_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Relay> {
        let relay = RelayActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            secret_key: Set(secret_key),
            secret_key_hash: Set(secret_key_hash),
            name: Set(None),
            url: Set(None),
            announced_ip: Set(None),
            port: Set(None),
            status: Set(RelayStatus::Pending.into()),
            last_heartbeat: Set(None),
            created_at: Set(now),
        };

        relay.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find relay by ID
    pub async fn find_relay_by_id(&self, id: Uuid) -> Result<Option<Relay>> {
        RelayEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// `(id, secret_key_hash)` for every relay, oldest first
    pub async fn list_relay_key_hashes(&self) -> Result<Vec<(Uuid, String)>> {
        RelayEntity::find()
            .select_only()
            .column(RelayColumn::Id)
            .column(RelayColumn::SecretKeyHash)
            .order_by_asc(RelayColumn::CreatedAt)
            .into_tuple::<(Uuid, String)>()
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Relays ordered by name ascending, optionally for one tenant.
    ///
    /// Sorted here rather than in SQL so the order is byte-wise on every
    /// backend. Pending relays (no name) come first.
    pub async fn list_relays(&self, tenant_id: Option<Uuid>) -> Result<Vec<Relay>> {
        let mut query = RelayEntity::find();
        if let Some(tenant_id) = tenant_id {
            query = query.filter(RelayColumn::TenantId.eq(tenant_id));
        }

        let mut relays = query.all(self.conn()).await?;
        relays.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(relays)
    }

    /// Record a successful registration: identity, online status and a fresh
    /// heartbeat. Returns `None` if the relay vanished between the credential
    /// scan and this write.
    ///
    /// Each statement is a single conditional UPDATE, so concurrent writers
    /// never hold a read lock they later need to upgrade.
    pub async fn apply_registration(
        &self,
        id: Uuid,
        identity: &RelayIdentity,
        now: DateTime<Utc>,
    ) -> Result<Option<Relay>> {
        let with_identity = || {
            RelayEntity::update_many()
                .col_expr(RelayColumn::Name, Expr::value(identity.name.clone()))
                .col_expr(RelayColumn::Url, Expr::value(identity.url.clone()))
                .col_expr(RelayColumn::AnnouncedIp, Expr::value(identity.announced_ip.clone()))
                .col_expr(RelayColumn::Port, Expr::value(i32::from(identity.port)))
                .col_expr(RelayColumn::Status, Expr::value(String::from(RelayStatus::Online)))
                .filter(RelayColumn::Id.eq(id))
        };

        let advanced = with_identity()
            .col_expr(RelayColumn::LastHeartbeat, Expr::value(now))
            .filter(heartbeat_older_than(now))
            .exec(self.conn())
            .await?;

        if advanced.rows_affected == 0 {
            // Stored heartbeat is already ahead of `now`; keep it
            let kept = with_identity().exec(self.conn()).await?;
            if kept.rows_affected == 0 {
                return Ok(None);
            }
        }

        self.find_relay_by_id(id).await
    }

    /// Refresh the heartbeat of a registered relay to `max(stored, now)`.
    /// Returns `false` for pending or unknown relays, which are left untouched.
    pub async fn record_heartbeat(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let advanced = RelayEntity::update_many()
            .col_expr(RelayColumn::LastHeartbeat, Expr::value(now))
            .col_expr(RelayColumn::Status, Expr::value(String::from(RelayStatus::Online)))
            .filter(RelayColumn::Id.eq(id))
            .filter(RelayColumn::Url.is_not_null())
            .filter(heartbeat_older_than(now))
            .exec(self.conn())
            .await?;

        if advanced.rows_affected > 0 {
            return Ok(true);
        }

        // Either unknown, pending, or already holding a newer heartbeat
        let touched = RelayEntity::update_many()
            .col_expr(RelayColumn::Status, Expr::value(String::from(RelayStatus::Online)))
            .filter(RelayColumn::Id.eq(id))
            .filter(RelayColumn::Url.is_not_null())
            .exec(self.conn())
            .await?;

        Ok(touched.rows_affected > 0)
    }

    /// Delete a relay credential owned by `tenant_id`
    pub async fn delete_relay(&self, tenant_id: Uuid, id: Uuid) -> Result<bool> {
        let result = RelayEntity::delete_many()
            .filter(RelayColumn::Id.eq(id))
            .filter(RelayColumn::TenantId.eq(tenant_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Room Operations
    // ========================================================================

    /// Insert a room. Duplicate `(tenant, name)` or slug surfaces as a conflict.
    pub async fn create_room(
        &self,
        tenant_id: Uuid,
        name: String,
        slug: String,
        is_local_only: bool,
        relay_url: String,
        ice_config: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Room> {
        let room = RoomActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(name),
            slug: Set(slug),
            is_local_only: Set(is_local_only),
            relay_url: Set(relay_url),
            ice_config: Set(ice_config),
            created_at: Set(now),
        };

        room.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find room by ID
    pub async fn find_room_by_id(&self, id: Uuid) -> Result<Option<Room>> {
        RoomEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find room by its public slug
    pub async fn find_room_by_slug(&self, slug: &str) -> Result<Option<Room>> {
        RoomEntity::find()
            .filter(RoomColumn::Slug.eq(slug))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// List rooms for a tenant, newest first
    pub async fn list_rooms(&self, tenant_id: Uuid) -> Result<Vec<Room>> {
        RoomEntity::find()
            .filter(RoomColumn::TenantId.eq(tenant_id))
            .order_by_desc(RoomColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Publisher Operations
    // ========================================================================

    /// Insert a publisher join credential
    pub async fn create_publisher(
        &self,
        room_id: Uuid,
        name: String,
        channel_name: String,
        join_token_hash: String,
        now: DateTime<Utc>,
    ) -> Result<Publisher> {
        let publisher = PublisherActiveModel {
            id: Set(Uuid::new_v4()),
            room_id: Set(room_id),
            name: Set(name),
            channel_name: Set(channel_name),
            join_token_hash: Set(join_token_hash),
            created_at: Set(now),
        };

        publisher.insert(self.conn()).await.map_err(Into::into)
    }

    /// Publishers of a room, oldest first
    pub async fn list_publishers(&self, room_id: Uuid) -> Result<Vec<Publisher>> {
        PublisherEntity::find()
            .filter(PublisherColumn::RoomId.eq(room_id))
            .order_by_asc(PublisherColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }
}

/// Heartbeats never move backwards, even if the writer's clock does
fn heartbeat_older_than(now: DateTime<Utc>) -> Condition {
    Condition::any()
        .add(RelayColumn::LastHeartbeat.is_null())
        .add(RelayColumn::LastHeartbeat.lt(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_repo() -> Repository {
        Repository::new(DbPool::in_memory().await.unwrap())
    }

    fn identity(name: &str) -> RelayIdentity {
        RelayIdentity {
            name: name.to_string(),
            url: format!("wss://{}:4443", name),
            announced_ip: "203.0.113.7".to_string(),
            port: 40000,
        }
    }

    async fn registered_relay(repo: &Repository, now: DateTime<Utc>) -> Relay {
        let tenant = repo.create_tenant("acme".into(), "h".into(), now).await.unwrap();
        let relay = repo
            .create_pending_relay(tenant.id, "k".into(), "kh".into(), now)
            .await
            .unwrap();
        repo.apply_registration(relay.id, &identity("edge-1"), now)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_heartbeat_is_monotonic() {
        let repo = test_repo().await;
        let now = Utc::now();
        let relay = registered_relay(&repo, now).await;

        // A writer with a slow clock must not move the heartbeat back
        assert!(repo.record_heartbeat(relay.id, now - Duration::seconds(5)).await.unwrap());
        let stored = repo.find_relay_by_id(relay.id).await.unwrap().unwrap();
        assert_eq!(stored.last_heartbeat, Some(now));

        assert!(repo.record_heartbeat(relay.id, now + Duration::seconds(5)).await.unwrap());
        let stored = repo.find_relay_by_id(relay.id).await.unwrap().unwrap();
        assert_eq!(stored.last_heartbeat, Some(now + Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_reregistration_keeps_newer_heartbeat() {
        let repo = test_repo().await;
        let now = Utc::now();
        let relay = registered_relay(&repo, now).await;

        let mut moved = identity("edge-1");
        moved.url = "wss://edge1-b:4443".to_string();
        let updated = repo
            .apply_registration(relay.id, &moved, now - Duration::seconds(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.url.as_deref(), Some("wss://edge1-b:4443"));
        assert_eq!(updated.last_heartbeat, Some(now));
        assert_eq!(updated.stored_status(), RelayStatus::Online);

        assert!(repo
            .apply_registration(Uuid::new_v4(), &moved, now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_and_find_tenant() {
        let repo = test_repo().await;
        let tenant = repo.create_tenant("acme".into(), "hash".into(), Utc::now()).await.unwrap();

        let found = repo.find_tenant_by_id(tenant.id).await.unwrap().unwrap();
        assert_eq!(found.name, "acme");
        assert!(repo.find_tenant_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_tenant_name_is_conflict() {
        let repo = test_repo().await;
        repo.create_tenant("acme".into(), "h1".into(), Utc::now()).await.unwrap();

        let err = repo.create_tenant("acme".into(), "h2".into(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, crate::AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_secret_hash_is_conflict() {
        let repo = test_repo().await;
        let tenant = repo.create_tenant("acme".into(), "h".into(), Utc::now()).await.unwrap();
        repo.create_pending_relay(tenant.id, "k1".into(), "same".into(), Utc::now()).await.unwrap();

        let err = repo
            .create_pending_relay(tenant.id, "k2".into(), "same".into(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_pending_relay_has_no_identity() {
        let repo = test_repo().await;
        let tenant = repo.create_tenant("acme".into(), "h".into(), Utc::now()).await.unwrap();
        let relay = repo
            .create_pending_relay(tenant.id, "k".into(), "kh".into(), Utc::now())
            .await
            .unwrap();

        assert_eq!(relay.stored_status(), RelayStatus::Pending);
        assert!(relay.name.is_none());
        assert!(relay.url.is_none());
        assert!(relay.last_heartbeat.is_none());
        assert!(!relay.is_registered());
    }

    #[tokio::test]
    async fn test_heartbeat_requires_registration() {
        let repo = test_repo().await;
        let tenant = repo.create_tenant("acme".into(), "h".into(), Utc::now()).await.unwrap();
        let relay = repo
            .create_pending_relay(tenant.id, "k".into(), "kh".into(), Utc::now())
            .await
            .unwrap();

        assert!(!repo.record_heartbeat(relay.id, Utc::now()).await.unwrap());

        repo.apply_registration(relay.id, &identity("edge-1"), Utc::now()).await.unwrap();
        assert!(repo.record_heartbeat(relay.id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_relays_orders_by_name_and_filters_tenant() {
        let repo = test_repo().await;
        let now = Utc::now();
        let a = repo.create_tenant("a".into(), "ha".into(), now).await.unwrap();
        let b = repo.create_tenant("b".into(), "hb".into(), now).await.unwrap();

        for (tenant, key, name) in [(a.id, "k1", "edge-2"), (a.id, "k2", "edge-1"), (b.id, "k3", "edge-0")] {
            let relay = repo
                .create_pending_relay(tenant, key.into(), format!("{}-hash", key), now)
                .await
                .unwrap();
            repo.apply_registration(relay.id, &identity(name), now).await.unwrap();
        }

        let names: Vec<_> = repo
            .list_relays(Some(a.id))
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["edge-1", "edge-2"]);
        assert_eq!(repo.list_relays(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_relays_uses_byte_order() {
        let repo = test_repo().await;
        let now = Utc::now();
        let tenant = repo.create_tenant("a".into(), "ha".into(), now).await.unwrap();

        for (key, name) in [("k1", "edge-a"), ("k2", "Edge-b"), ("k3", "edge_c")] {
            let relay = repo
                .create_pending_relay(tenant.id, key.into(), format!("{}-hash", key), now)
                .await
                .unwrap();
            repo.apply_registration(relay.id, &identity(name), now).await.unwrap();
        }
        repo.create_pending_relay(tenant.id, "k4".into(), "k4-hash".into(), now)
            .await
            .unwrap();

        let names: Vec<_> = repo
            .list_relays(Some(tenant.id))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(
            names,
            vec![
                None,
                Some("Edge-b".to_string()),
                Some("edge-a".to_string()),
                Some("edge_c".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_relay_scoped_to_tenant() {
        let repo = test_repo().await;
        let now = Utc::now();
        let a = repo.create_tenant("a".into(), "ha".into(), now).await.unwrap();
        let b = repo.create_tenant("b".into(), "hb".into(), now).await.unwrap();
        let relay = repo.create_pending_relay(a.id, "k".into(), "kh".into(), now).await.unwrap();

        assert!(!repo.delete_relay(b.id, relay.id).await.unwrap());
        assert!(repo.delete_relay(a.id, relay.id).await.unwrap());
        assert!(repo.find_relay_by_id(relay.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_room_name_unique_per_tenant() {
        let repo = test_repo().await;
        let now = Utc::now();
        let a = repo.create_tenant("a".into(), "ha".into(), now).await.unwrap();
        let b = repo.create_tenant("b".into(), "hb".into(), now).await.unwrap();
        let ice = serde_json::json!({"iceServers": []});

        repo.create_room(a.id, "Main".into(), "main-1".into(), false, "wss://pool".into(), ice.clone(), now)
            .await
            .unwrap();
        // Same name under another tenant is fine
        repo.create_room(b.id, "Main".into(), "main-2".into(), false, "wss://pool".into(), ice.clone(), now)
            .await
            .unwrap();

        let err = repo
            .create_room(a.id, "Main".into(), "main-3".into(), false, "wss://pool".into(), ice, now)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::AppError::Conflict { .. }));
    }
}
