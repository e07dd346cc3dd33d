//! HTTP client for the registry's relay endpoints

use airwave_common::{
    errors::{AppError, ErrorResponse, Result},
    wire::{HeartbeatRequest, HeartbeatResponse, RelayDescriptor, RelayRegistration},
};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use uuid::Uuid;

/// Talks to `{registry_url}/relays/*`
#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(registry_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("airwave-relay-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: registry_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn register(&self, registration: &RelayRegistration) -> Result<RelayDescriptor> {
        let response = self
            .http
            .post(format!("{}/relays/register", self.base_url))
            .json(registration)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// `Ok(false)` means the registry no longer knows this relay
    pub async fn heartbeat(&self, relay_id: Uuid) -> Result<bool> {
        let response = self
            .http
            .post(format!("{}/relays/heartbeat", self.base_url))
            .json(&HeartbeatRequest { relay_id })
            .send()
            .await?;

        let body: HeartbeatResponse = check(response).await?.json().await?;
        Ok(body.ok)
    }
}

/// Turn registry error responses back into [`AppError`]s
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|body| body.error.message)
        .unwrap_or(text);

    Err(match status {
        StatusCode::UNAUTHORIZED => AppError::InvalidRelayKey,
        StatusCode::BAD_REQUEST => AppError::validation(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited { limit: 0 },
        _ => AppError::Upstream {
            message: format!("registry returned {}: {}", status, message),
        },
    })
}
