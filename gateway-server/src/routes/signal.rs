//! `/api/signal*` (spec.md §6 route table).

use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use gateway_core::storage::{SignalHistoryQuery, SignalRepository};

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn get_signal(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.poller.current_data().await {
        Some(sample) => Ok(Json(json!(sample))),
        None => Err(ApiError::service_unavailable("No signal data available")),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: f64,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_duration_minutes() -> f64 {
    60.0
}

fn default_resolution() -> String {
    "auto".to_string()
}

pub async fn get_signal_history(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> Result<Json<Value>, ApiError> {
    let data = state
        .repo
        .query_signal_history(SignalHistoryQuery { duration_minutes: params.duration_minutes, resolution: params.resolution.clone() })
        .await?;

    Ok(Json(json!({
        "count": data.len(),
        "duration_minutes": params.duration_minutes,
        "resolution": params.resolution,
        "data": data,
    })))
}
