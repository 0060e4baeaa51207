//! `/api/scheduler/*` (spec.md §6 route table, §4.6).

use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use gateway_core::scheduler::SchedulerConfig;

use crate::errors::ApiError;
use crate::state::AppState;

pub async fn get_scheduler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.scheduler.stats().await))
}

pub async fn post_scheduler_start(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.scheduler.start().await?;
    Ok(Json(json!({ "running": true })))
}

pub async fn post_scheduler_stop(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.scheduler.stop().await?;
    Ok(Json(json!({ "running": false })))
}

pub async fn post_scheduler_run_now(State(state): State<AppState>) -> Json<Value> {
    state.scheduler.run_cycle_now().await;
    Json(json!(state.scheduler.stats().await))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: f64,
    pub time_window_start_hour: Option<u32>,
    pub time_window_end_hour: Option<u32>,
    pub run_on_weekends: bool,
    #[serde(default)]
    pub tools_to_run: Vec<String>,
    #[serde(default = "default_delay")]
    pub delay_between_tools_seconds: u64,
}

fn default_delay() -> u64 {
    10
}

pub async fn put_scheduler_config(State(state): State<AppState>, Json(body): Json<UpdateSchedulerConfig>) -> Json<Value> {
    state
        .scheduler
        .update_config(SchedulerConfig {
            enabled: body.enabled,
            interval_minutes: body.interval_minutes,
            time_window_start_hour: body.time_window_start_hour,
            time_window_end_hour: body.time_window_end_hour,
            run_on_weekends: body.run_on_weekends,
            tools_to_run: body.tools_to_run,
            delay_between_tools_seconds: body.delay_between_tools_seconds,
        })
        .await;
    Json(json!(state.scheduler.stats().await))
}
