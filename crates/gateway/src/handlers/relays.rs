//! Relay fleet handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use airwave_common::{
    auth::{generate_secret, AuthContext, RELAY_KEY_PREFIX},
    errors::Result,
    fleet::{Liveness, RelayHealth, StalenessWarning},
    wire::{HeartbeatRequest, HeartbeatResponse, RelayDescriptor, RelayRegistration},
};

/// Request to issue a relay key. Omit `secret_key` to have one generated.
#[derive(Debug, Default, Deserialize)]
pub struct IssueKeyRequest {
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// Issued relay credential, including the plaintext key for display
#[derive(Serialize)]
pub struct IssueKeyResponse {
    pub relay: RelayDescriptor,
    pub secret_key: String,
}

#[derive(Serialize)]
pub struct RelayHealthView {
    #[serde(flatten)]
    pub relay: RelayDescriptor,
    pub liveness: Liveness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<StalenessWarning>,
}

#[derive(Serialize)]
pub struct RelayListResponse {
    pub relays: Vec<RelayHealthView>,
    pub stale_window_secs: u64,
}

#[derive(Serialize)]
pub struct OnlineRelaysResponse {
    pub relays: Vec<RelayDescriptor>,
    pub total: usize,
}

/// Register a relay by proof of key possession
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RelayRegistration>,
) -> Result<Json<RelayDescriptor>> {
    let relay = state.fleet.relays.register(&request).await?;
    Ok(Json(RelayDescriptor::from_relay(relay, state.heartbeat_interval_secs())))
}

/// Refresh a relay's heartbeat. `ok: false` asks the relay to register again.
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>> {
    let ok = state.fleet.liveness.heartbeat(request.relay_id).await?;
    Ok(Json(HeartbeatResponse { ok }))
}

/// Issue a pending relay key for the calling tenant
pub async fn issue_key(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<IssueKeyRequest>,
) -> Result<(StatusCode, Json<IssueKeyResponse>)> {
    let secret = request
        .secret_key
        .unwrap_or_else(|| generate_secret(RELAY_KEY_PREFIX));

    let relay = state.fleet.relays.issue_key(auth.tenant_id, &secret).await?;

    tracing::info!(
        tenant_id = %auth.tenant_id,
        relay_id = %relay.id,
        request_id = %auth.request_id,
        "Relay key issued via API"
    );

    Ok((
        StatusCode::CREATED,
        Json(IssueKeyResponse {
            secret_key: relay.secret_key.clone(),
            relay: RelayDescriptor::from_relay(relay, state.heartbeat_interval_secs()),
        }),
    ))
}

/// Every relay of the tenant with its derived liveness
pub async fn list_relays(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<RelayListResponse>> {
    let interval = state.heartbeat_interval_secs();
    let relays = state
        .fleet
        .liveness
        .relay_health(auth.tenant_id)
        .await?
        .into_iter()
        .map(|RelayHealth { relay, liveness, warning }| RelayHealthView {
            relay: RelayDescriptor::from_relay(relay, interval),
            liveness,
            warning,
        })
        .collect();

    Ok(Json(RelayListResponse {
        relays,
        stale_window_secs: state.fleet.liveness.stale_window().as_secs(),
    }))
}

/// The tenant's relays that are reachable right now
pub async fn list_online(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OnlineRelaysResponse>> {
    let relays = state.fleet.liveness.list_online(Some(auth.tenant_id)).await?;
    Ok(Json(online_response(relays, state.heartbeat_interval_secs())))
}

pub(crate) fn online_response(
    relays: Vec<airwave_common::db::models::Relay>,
    heartbeat_interval_secs: u64,
) -> OnlineRelaysResponse {
    let relays: Vec<RelayDescriptor> = relays
        .into_iter()
        .map(|relay| RelayDescriptor::from_relay(relay, heartbeat_interval_secs))
        .collect();
    OnlineRelaysResponse {
        total: relays.len(),
        relays,
    }
}

/// Revoke a relay credential
pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(relay_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.fleet.relays.revoke(auth.tenant_id, relay_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
