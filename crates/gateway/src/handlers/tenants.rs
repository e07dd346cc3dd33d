//! Admin bootstrap handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::relays::{online_response, OnlineRelaysResponse};
use crate::AppState;
use airwave_common::errors::Result;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
}

/// Created tenant. The API key is only ever shown here.
#[derive(Serialize)]
pub struct CreateTenantResponse {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct RotateKeyResponse {
    pub tenant_id: Uuid,
    pub api_key: String,
}

/// Bootstrap a tenant
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<CreateTenantResponse>)> {
    request.validate()?;

    let (tenant, api_key) = state.fleet.tenants.create_tenant(&request.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTenantResponse {
            id: tenant.id,
            name: tenant.name,
            api_key,
            created_at: tenant.created_at,
        }),
    ))
}

/// Replace a tenant's API key
pub async fn rotate_key(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<RotateKeyResponse>> {
    let api_key = state.fleet.tenants.rotate_key(tenant_id).await?;
    Ok(Json(RotateKeyResponse { tenant_id, api_key }))
}

/// Online relays across all tenants
pub async fn list_all_online(State(state): State<AppState>) -> Result<Json<OnlineRelaysResponse>> {
    let relays = state.fleet.liveness.list_online(None).await?;
    Ok(Json(online_response(relays, state.heartbeat_interval_secs())))
}
