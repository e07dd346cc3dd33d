//! Relay key issuance and registration
//!
//! A tenant issues a key, which creates a `pending` relay row with no network
//! identity. A relay process proves possession of that key by registering;
//! the matching row gains its identity, turns online and gets a heartbeat.

use super::events::{FleetEvent, FleetEvents};
use crate::auth::{credential_fingerprint, CredentialHasher};
use crate::clock::SharedClock;
use crate::db::models::Relay;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::wire::RelayRegistration;
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

/// Shortest relay key accepted at issue time
pub const MIN_RELAY_KEY_LEN: usize = 16;

/// Issues relay credentials and registers relays against them
#[derive(Clone)]
pub struct RelayRegistry {
    repo: Repository,
    hasher: CredentialHasher,
    clock: SharedClock,
    events: FleetEvents,
}

impl RelayRegistry {
    pub fn new(repo: Repository, hasher: CredentialHasher, clock: SharedClock, events: FleetEvents) -> Self {
        Self {
            repo,
            hasher,
            clock,
            events,
        }
    }

    /// Create a pending relay credential for `tenant_id`.
    ///
    /// The plaintext is stored alongside its hash so the tenant can display it
    /// again; only the hash is ever used for verification.
    pub async fn issue_key(&self, tenant_id: Uuid, secret: &str) -> Result<Relay> {
        if secret.trim().is_empty() {
            return Err(AppError::invalid_field("secret_key", "Relay key must not be empty"));
        }
        if secret.len() < MIN_RELAY_KEY_LEN {
            return Err(AppError::invalid_field(
                "secret_key",
                format!("Relay key must be at least {} characters", MIN_RELAY_KEY_LEN),
            ));
        }

        if self.repo.find_tenant_by_id(tenant_id).await?.is_none() {
            return Err(AppError::invalid_field("tenant_id", "Unknown tenant"));
        }

        let hash = self.hasher.hash(secret)?;
        let relay = self
            .repo
            .create_pending_relay(tenant_id, secret.to_string(), hash, self.clock.now())
            .await?;

        metrics::record_key_issued();
        tracing::info!(tenant_id = %tenant_id, relay_id = %relay.id, "Relay key issued");
        Ok(relay)
    }

    /// Register a relay by proof of key possession.
    ///
    /// Every stored relay hash is verified against the presented key until one
    /// matches, so the cost is O(relays) argon2 verifications per call. This
    /// is a deliberate limit of salted credentials and must not be turned into
    /// an indexed lookup. Callers are expected to rate limit this path.
    ///
    /// Registering again with the same key refreshes the identity and the
    /// heartbeat of the existing row; no row is ever created here.
    pub async fn register(&self, registration: &RelayRegistration) -> Result<Relay> {
        if let Err(e) = registration.validate() {
            metrics::record_registration("invalid");
            return Err(e.into());
        }

        let candidates = self.repo.list_relay_key_hashes().await?;
        let start = Instant::now();
        let matched = self
            .hasher
            .find_match_blocking(registration.secret_key.clone(), candidates)
            .await?;
        metrics::record_credential_scan("relay_key", start.elapsed().as_secs_f64());

        let Some(relay_id) = matched else {
            return Err(self.reject(registration));
        };

        let identity = registration.identity();
        let Some(relay) = self
            .repo
            .apply_registration(relay_id, &identity, self.clock.now())
            .await?
        else {
            // Revoked between the scan and the write
            return Err(self.reject(registration));
        };

        metrics::record_registration("registered");
        tracing::info!(
            relay_id = %relay.id,
            tenant_id = %relay.tenant_id,
            name = %identity.name,
            url = %identity.url,
            "Relay registered"
        );

        self.events.publish(FleetEvent::RelayOnline {
            relay_id: relay.id,
            tenant_id: relay.tenant_id,
            name: identity.name,
            url: identity.url,
        });

        Ok(relay)
    }

    fn reject(&self, registration: &RelayRegistration) -> AppError {
        metrics::record_registration("rejected");
        tracing::warn!(
            name = %registration.name,
            announced_ip = %registration.announced_ip,
            fingerprint = %credential_fingerprint(&registration.secret_key),
            "Relay registration rejected"
        );
        AppError::InvalidRelayKey
    }

    /// Delete a relay credential. Other tenants' relays are reported as missing.
    pub async fn revoke(&self, tenant_id: Uuid, relay_id: Uuid) -> Result<()> {
        if !self.repo.delete_relay(tenant_id, relay_id).await? {
            return Err(AppError::NotFound {
                resource_type: "Relay".to_string(),
                id: relay_id.to_string(),
            });
        }

        tracing::info!(tenant_id = %tenant_id, relay_id = %relay_id, "Relay revoked");
        Ok(())
    }
}
