//! `/api/gateway/status` (spec.md §6 route table) — a derived connectivity
//! summary over the poller's live state and running stats.

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn get_gateway_status(State(state): State<AppState>) -> Json<Value> {
    let stats = state.poller.stats().await;
    let current = state.poller.current_data().await;

    let connection_mode = current.as_ref().map(|s| s.connection_mode().to_string());

    Json(json!({
        "stats": stats,
        "current_signal": current,
        "connection_mode": connection_mode,
    }))
}
