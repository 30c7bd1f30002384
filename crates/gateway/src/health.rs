use axum::{extract::State, response::Json};

use crate::state::AppState;

/// `GET /healthz`: liveness/readiness probe reporting this instance's
/// current connection count. Not part of the wire protocol in §6, but
/// every deployable service in this codebase's ambient stack exposes one.
pub async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "instance_id": state.hub.instance_id(),
        "connections": state.hub.connection_count().await,
    }))
}
