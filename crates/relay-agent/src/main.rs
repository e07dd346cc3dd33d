//! Airwave Relay Agent
//!
//! Runs next to a media relay:
//! 1. Registers the relay with the registry using its relay key
//! 2. Heartbeats on a fixed period
//! 3. Registers again whenever the registry stops recognising it

mod agent;
mod client;


use crate::agent::RelayAgent;
use crate::client::RegistryClient;
use airwave_common::{config::RelayAgentConfig, metrics, wire::RelayRegistration, VERSION};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = RelayAgentConfig::load()?;
    metrics::init_tracing(&config.observability);

    info!(
        name = %config.name,
        url = %config.url,
        registry = %config.registry_url,
        "Starting Airwave Relay Agent v{}",
        VERSION
    );

    let client = RegistryClient::new(&config.registry_url, config.request_timeout())?;
    let registration = RelayRegistration {
        secret_key: config.secret_key.clone(),
        name: config.name.clone(),
        url: config.url.clone(),
        announced_ip: config.announced_ip.clone(),
        port: config.port,
    };

    let agent = RelayAgent::new(
        client,
        registration,
        config.heartbeat_interval(),
        Duration::from_secs(config.max_registration_elapsed_secs),
    )?;

    agent
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Relay agent stopped");
    Ok(())
}
