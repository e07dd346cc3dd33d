//! Room management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use airwave_common::{
    auth::AuthContext,
    db::models::Room,
    errors::Result,
    fleet::{NewRoom, RelaySelection},
};

/// Request to create a room
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    /// Bind to one of the tenant's own relays instead of the shared pool
    #[serde(default)]
    pub is_local_only: bool,

    /// Specific tenant relay for a local-only room
    #[serde(default)]
    pub relay_id: Option<Uuid>,

    /// Opaque ICE configuration handed to clients; defaults from config
    #[serde(default)]
    pub ice_config: Option<serde_json::Value>,

    /// For local-only rooms, wait this long for a tenant relay to come online
    #[serde(default)]
    pub wait_for_relay_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct RoomResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_local_only: bool,
    pub relay_url: String,
    pub ice_config: serde_json::Value,
    pub join_path: String,
    pub created_at: DateTime<Utc>,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            join_path: format!("/v1/join/{}", room.slug),
            id: room.id,
            name: room.name,
            slug: room.slug,
            is_local_only: room.is_local_only,
            relay_url: room.relay_url,
            ice_config: room.ice_config,
            created_at: room.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomResponse>,
    pub total: usize,
}

/// Request to issue a publisher join token
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePublisherRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[serde(default)]
    pub channel_name: Option<String>,
}

/// Issued join token, shown once
#[derive(Serialize)]
pub struct PublisherResponse {
    pub id: Uuid,
    pub room_id: Uuid,
    pub name: String,
    pub channel_name: String,
    pub join_token: String,
    pub join_path: String,
}

/// Create a room bound to a relay
pub async fn create_room(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>)> {
    request.validate()?;

    let relay = match request.relay_id {
        Some(id) => RelaySelection::Relay(id),
        None => RelaySelection::Auto,
    };

    if request.is_local_only && relay == RelaySelection::Auto {
        if let Some(secs) = request.wait_for_relay_secs.filter(|s| *s > 0) {
            let waited = state
                .fleet
                .rooms
                .await_local_relay(auth.tenant_id, Duration::from_secs(secs))
                .await?;
            if waited.is_none() {
                tracing::info!(tenant_id = %auth.tenant_id, secs, "No tenant relay came online while waiting");
            }
        }
    }

    let room = state
        .fleet
        .rooms
        .create_room(NewRoom {
            tenant_id: auth.tenant_id,
            name: request.name,
            is_local_only: request.is_local_only,
            relay,
            ice_config: request.ice_config,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(room.into())))
}

/// List the tenant's rooms, newest first
pub async fn list_rooms(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<RoomListResponse>> {
    let rooms: Vec<RoomResponse> = state
        .fleet
        .rooms
        .list_rooms(auth.tenant_id)
        .await?
        .into_iter()
        .map(RoomResponse::from)
        .collect();

    Ok(Json(RoomListResponse {
        total: rooms.len(),
        rooms,
    }))
}

/// Get a room by ID
pub async fn get_room(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomResponse>> {
    let room = state.fleet.rooms.get_room(auth.tenant_id, room_id).await?;
    Ok(Json(room.into()))
}

/// Issue a publisher join token for a room
pub async fn create_publisher(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(room_id): Path<Uuid>,
    Json(request): Json<CreatePublisherRequest>,
) -> Result<(StatusCode, Json<PublisherResponse>)> {
    request.validate()?;

    let room = state.fleet.rooms.get_room(auth.tenant_id, room_id).await?;
    let (publisher, join_token) = state
        .fleet
        .publishers
        .issue(auth.tenant_id, room.id, &request.name, request.channel_name.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PublisherResponse {
            id: publisher.id,
            room_id: publisher.room_id,
            name: publisher.name,
            channel_name: publisher.channel_name,
            join_token,
            join_path: format!("/v1/join/{}", room.slug),
        }),
    ))
}
