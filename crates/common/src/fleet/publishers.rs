//! Publisher join tokens
//!
//! An interpreter or other publisher joins a room by slug with a token issued
//! by the room's tenant. Tokens follow the same salted-hash pattern as relay
//! keys: stored hashed, resolved by scanning the room's publishers.

use super::rooms::find_tenant_room;
use crate::auth::{credential_fingerprint, generate_secret, CredentialHasher, JOIN_TOKEN_PREFIX};
use crate::clock::SharedClock;
use crate::db::models::Publisher;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// What a publisher needs to connect to its room's relay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinGrant {
    pub room_id: Uuid,
    pub room_name: String,
    pub slug: String,
    pub relay_url: String,
    pub ice_config: Value,
    pub publisher_id: Uuid,
    pub publisher_name: String,
    pub channel_name: String,
}

#[derive(Clone)]
pub struct PublisherRegistry {
    repo: Repository,
    hasher: CredentialHasher,
    clock: SharedClock,
}

impl PublisherRegistry {
    pub fn new(repo: Repository, hasher: CredentialHasher, clock: SharedClock) -> Self {
        Self { repo, hasher, clock }
    }

    /// Issue a join token for a room owned by `tenant_id`. The channel name
    /// defaults to the publisher name.
    pub async fn issue(
        &self,
        tenant_id: Uuid,
        room_id: Uuid,
        name: &str,
        channel_name: Option<&str>,
    ) -> Result<(Publisher, String)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_field("name", "Publisher name must not be empty"));
        }
        let channel_name = channel_name.map(str::trim).filter(|c| !c.is_empty()).unwrap_or(name);

        let room = find_tenant_room(&self.repo, tenant_id, room_id).await?;

        let token = generate_secret(JOIN_TOKEN_PREFIX);
        let hash = self.hasher.hash(&token)?;
        let publisher = self
            .repo
            .create_publisher(room.id, name.to_string(), channel_name.to_string(), hash, self.clock.now())
            .await?;

        tracing::info!(room_id = %room.id, publisher_id = %publisher.id, "Publisher join token issued");
        Ok((publisher, token))
    }

    /// Exchange a join token for the room's relay binding
    pub async fn join(&self, slug: &str, token: &str) -> Result<JoinGrant> {
        let room = self
            .repo
            .find_room_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::RoomNotFound { id: slug.to_string() })?;

        let candidates: Vec<(Publisher, String)> = self
            .repo
            .list_publishers(room.id)
            .await?
            .into_iter()
            .map(|publisher| {
                let hash = publisher.join_token_hash.clone();
                (publisher, hash)
            })
            .collect();

        let start = Instant::now();
        let found = self
            .hasher
            .find_match_blocking(token.to_string(), candidates)
            .await?;
        metrics::record_credential_scan("join_token", start.elapsed().as_secs_f64());

        let Some(publisher) = found else {
            metrics::record_auth_failure("join_token");
            tracing::warn!(slug = %slug, fingerprint = %credential_fingerprint(token), "Rejected join token");
            return Err(AppError::InvalidJoinToken);
        };

        Ok(JoinGrant {
            room_id: room.id,
            room_name: room.name,
            slug: room.slug,
            relay_url: room.relay_url,
            ice_config: room.ice_config,
            publisher_id: publisher.id,
            publisher_name: publisher.name,
            channel_name: publisher.channel_name,
        })
    }
}
