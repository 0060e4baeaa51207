//! `/api/alerts*` (spec.md §6 route table, §4.4 "Mutations").

use axum::extract::{Path, State};
use axum::response::Json;
use serde_json::{json, Value};

use gateway_core::types::AlertId;

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn get_alerts(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.alerts.active().await))
}

pub async fn get_alert_history(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.alerts.history().await))
}

pub async fn post_acknowledge(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let found = state.alerts.acknowledge(AlertId(id.clone())).await;
    if !found {
        return Err(ApiError::not_found(format!("no alert with id {id}")));
    }
    Ok(Json(json!({ "acknowledged": true })))
}

pub async fn post_clear(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let found = state.alerts.clear(AlertId(id.clone())).await;
    if !found {
        return Err(ApiError::not_found(format!("no active alert with id {id}")));
    }
    Ok(Json(json!({ "cleared": true })))
}

pub async fn post_clear_all(State(state): State<AppState>) -> Json<Value> {
    let count = state.alerts.clear_all().await;
    Json(json!({ "cleared": count }))
}
