//! Registration and heartbeat loop
//!
//! The agent registers once (retrying transport failures with exponential
//! backoff), then heartbeats on a fixed period. A heartbeat answered with
//! `ok: false` means the registry lost track of the relay, so the agent
//! registers again with the same key.

use crate::client::RegistryClient;
use airwave_common::{
    errors::{AppError, Result},
    wire::{RelayDescriptor, RelayRegistration},
};
use backoff::{future::retry, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use validator::Validate;

pub struct RelayAgent {
    client: RegistryClient,
    registration: RelayRegistration,
    heartbeat_interval: Duration,
    max_registration_elapsed: Duration,
}

impl RelayAgent {
    pub fn new(
        client: RegistryClient,
        registration: RelayRegistration,
        heartbeat_interval: Duration,
        max_registration_elapsed: Duration,
    ) -> Result<Self> {
        registration.validate()?;

        Ok(Self {
            client,
            registration,
            heartbeat_interval,
            max_registration_elapsed,
        })
    }

    /// Register, retrying transient failures. A rejected key or invalid
    /// registration fails immediately.
    pub async fn register(&self) -> Result<RelayDescriptor> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(Some(self.max_registration_elapsed))
            .build();

        let client = &self.client;
        let registration = &self.registration;
        let descriptor = retry(policy, || async move {
            client.register(registration).await.map_err(|e| match e {
                AppError::InvalidRelayKey | AppError::Validation { .. } => backoff::Error::permanent(e),
                other => {
                    warn!(error = %other, "Registration attempt failed, retrying");
                    backoff::Error::transient(other)
                }
            })
        })
        .await?;

        info!(
            relay_id = %descriptor.id,
            name = %self.registration.name,
            heartbeat_interval_secs = descriptor.heartbeat_interval_secs,
            "Registered with registry"
        );
        Ok(descriptor)
    }

    /// Run until `shutdown` resolves or registration fails permanently
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        let mut relay_id = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            descriptor = self.register() => descriptor?.id,
        };

        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; registration just refreshed us
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping heartbeats");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.client.heartbeat(relay_id).await {
                Ok(true) => debug!(relay_id = %relay_id, "Heartbeat acknowledged"),
                Ok(false) => {
                    warn!(relay_id = %relay_id, "Registry does not know this relay, registering again");
                    relay_id = tokio::select! {
                        _ = &mut shutdown => return Ok(()),
                        descriptor = self.register() => descriptor?.id,
                    };
                }
                Err(e) => warn!(relay_id = %relay_id, error = %e, "Heartbeat failed, will retry next tick"),
            }
        }
    }
}
