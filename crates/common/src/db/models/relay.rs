//! Relay entity
//!
//! A relay row is created `pending` when a tenant issues a key and only gains
//! a network identity once the relay process registers with that key.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored relay status.
///
/// This column is a display hint. Whether a relay is reachable is derived from
/// `last_heartbeat` at read time, see `fleet::liveness`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Pending,
    Online,
    Offline,
}

impl RelayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStatus::Pending => "pending",
            RelayStatus::Online => "online",
            RelayStatus::Offline => "offline",
        }
    }
}

impl From<String> for RelayStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "online" => RelayStatus::Online,
            "offline" => RelayStatus::Offline,
            _ => RelayStatus::Pending,
        }
    }
}

impl From<RelayStatus> for String {
    fn from(status: RelayStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "relays")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub tenant_id: Uuid,

    /// Plaintext key, kept for admin display only
    #[sea_orm(column_type = "Text")]
    pub secret_key: String,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", unique)]
    pub secret_key_hash: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub announced_ip: Option<String>,

    pub port: Option<i32>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub last_heartbeat: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn stored_status(&self) -> RelayStatus {
        RelayStatus::from(self.status.clone())
    }

    /// A relay has an identity once it has registered at least once
    pub fn is_registered(&self) -> bool {
        self.url.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id",
        on_delete = "Cascade"
    )]
    Tenant,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
