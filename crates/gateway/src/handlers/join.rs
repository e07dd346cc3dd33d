//! Publisher join handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::AppState;
use airwave_common::{errors::Result, fleet::JoinGrant};

#[derive(Deserialize)]
pub struct JoinRequest {
    pub token: String,
}

/// Exchange a publisher join token for the room's relay binding
pub async fn join(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinGrant>> {
    let grant = state.fleet.publishers.join(&slug, &request.token).await?;

    tracing::info!(
        room_id = %grant.room_id,
        publisher_id = %grant.publisher_id,
        channel = %grant.channel_name,
        "Publisher joined"
    );
    Ok(Json(grant))
}
