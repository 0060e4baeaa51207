//! `/api/speedtest*` (spec.md §6 route table, §4.5).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use gateway_core::speedtest::RunOptions;
use gateway_core::storage::SignalRepository;
use gateway_core::types::{SpeedtestStatus, TriggeredBy};

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RunSpeedtestBody {
    pub tool_name: Option<String>,
    pub server_override: Option<String>,
}

pub async fn post_speedtest(
    State(state): State<AppState>,
    Json(body): Json<RunSpeedtestBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let signal_snapshot = state.poller.current_raw().await;

    let opts = RunOptions {
        tool_name: body.tool_name,
        server_override: body.server_override,
        triggered_by: TriggeredBy::Api,
        signal_snapshot,
        skip_context_probe: false,
        context_override: None,
    };

    let result = state.speedtest.run(opts).await?;
    let status = match result.status {
        SpeedtestStatus::Success => StatusCode::OK,
        SpeedtestStatus::Busy => StatusCode::CONFLICT,
        SpeedtestStatus::Timeout => StatusCode::GATEWAY_TIMEOUT,
        SpeedtestStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Ok((status, Json(json!(result))))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn get_speedtests(State(state): State<AppState>, Query(params): Query<ListParams>) -> Result<Json<Value>, ApiError> {
    let data = state.repo.query_speedtests(params.limit).await?;
    Ok(Json(json!({ "count": data.len(), "data": data })))
}
