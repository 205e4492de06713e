use axum::{extract::State, Json};
use serde::Serialize;

use crate::api_state::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: serde_json::Value,
}

/// `GET /health`: probes the Store Repository and Blob Store Gateway.
/// `status` is `ok` iff every probe succeeds, `degraded` otherwise. Always
/// returns `200`; the body carries the actual health state (spec §7: user-
/// visible failures are a `degraded` status, not a 5xx).
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let store_ok = state.db.client.query("RETURN 1;").await.is_ok();
    let blob_store_ok = state.storage.exists("__health_check__").await.is_ok();

    let status = if store_ok && blob_store_ok {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        checks: serde_json::json!({
            "store": if store_ok { "ok" } else { "error" },
            "blob_store": if blob_store_ok { "ok" } else { "error" },
        }),
    })
}
