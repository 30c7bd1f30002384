use std::sync::Arc;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chatcore_protocol::{Device, MAX_MESSAGE_SIZE};
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpgradeParams {
    #[serde(default)]
    device: Option<String>,
}

/// Extracts the bearer token from `Authorization: Bearer <token>`. No token,
/// or a header that isn't the `Bearer` scheme, both resolve to `None` — the
/// caller maps that to a 401 same as an explicitly rejected token.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

/// `GET /ws`: validates the bearer token against the profile service,
/// upgrades on success, and hands the socket to the per-connection
/// read/write loops. On failure responds `401` without upgrading, per
/// §6's external interface contract.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<UpgradeParams>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "missing bearer token"}))).into_response();
    };

    let user_id = match state.token_validator.validate_token(token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "invalid token"}))).into_response();
        },
        Err(err) => {
            warn!(%err, "token validation rpc failed");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": "auth unavailable"})))
                .into_response();
        },
    };

    let device = params.device.as_deref().and_then(Device::parse).unwrap_or(Device::Web);
    let conn_id = chatcore_ws::next_conn_id();
    info!(user_id, conn_id, device = device.as_str(), "ws upgrade accepted");

    let hub = Arc::clone(&state.hub);
    let presence = Arc::clone(&state.presence);
    let router_ctx = state.router_ctx.clone();

    ws.max_message_size(MAX_MESSAGE_SIZE).on_upgrade(move |socket| async move {
        chatcore_ws::serve(socket, user_id, conn_id, device, hub, presence, router_ctx).await;
    })
}
