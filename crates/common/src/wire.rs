//! Request and response bodies shared by the gateway and the relay agent

use crate::db::models::{Relay, RelayStatus};
use crate::db::RelayIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Body of `POST /v1/relays/register`
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct RelayRegistration {
    #[validate(length(min = 1, message = "secret_key must not be empty"))]
    pub secret_key: String,

    #[validate(custom(function = "validate_relay_name"))]
    pub name: String,

    #[validate(custom(function = "validate_relay_url"))]
    pub url: String,

    #[validate(ip)]
    pub announced_ip: String,

    #[validate(range(min = 1))]
    pub port: u16,
}

impl RelayRegistration {
    pub fn identity(&self) -> RelayIdentity {
        RelayIdentity {
            name: self.name.trim().to_string(),
            url: self.url.trim().to_string(),
            announced_ip: self.announced_ip.trim().to_string(),
            port: self.port,
        }
    }
}

// Never print the key
impl std::fmt::Debug for RelayRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRegistration")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("announced_ip", &self.announced_ip)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

const MAX_RELAY_NAME_LEN: usize = 128;

// Checked after trimming, which is how the name is stored
fn validate_relay_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if (1..=MAX_RELAY_NAME_LEN).contains(&len) {
        return Ok(());
    }
    Err(ValidationError::new("relay_name")
        .with_message(Cow::Borrowed("name must be 1-128 characters")))
}

fn validate_relay_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"));

    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ValidationError::new("relay_url")
            .with_message(Cow::Borrowed("url must start with ws:// or wss://"))),
    }
}

/// A relay as seen over the wire: no key, no hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDescriptor {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: Option<String>,
    pub url: Option<String>,
    pub announced_ip: Option<String>,
    pub port: Option<u16>,
    pub status: RelayStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,

    /// How often the registry expects a heartbeat from this relay
    pub heartbeat_interval_secs: u64,
}

impl RelayDescriptor {
    pub fn from_relay(relay: Relay, heartbeat_interval_secs: u64) -> Self {
        let status = relay.stored_status();
        Self {
            id: relay.id,
            tenant_id: relay.tenant_id,
            name: relay.name,
            url: relay.url,
            announced_ip: relay.announced_ip,
            port: relay.port.and_then(|p| u16::try_from(p).ok()),
            status,
            last_heartbeat: relay.last_heartbeat,
            created_at: relay.created_at,
            heartbeat_interval_secs,
        }
    }
}

/// Body of `POST /v1/relays/heartbeat`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub relay_id: Uuid,
}

/// `ok == false` tells the relay to register again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
}
