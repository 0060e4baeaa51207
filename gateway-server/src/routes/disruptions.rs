//! `/api/disruptions` (spec.md §6 route table, §4.2, §4.3).

use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use gateway_core::storage::SignalRepository;

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DisruptionsParams {
    #[serde(default = "default_hours")]
    pub hours: f64,
}

fn default_hours() -> f64 {
    24.0
}

pub async fn get_disruptions(State(state): State<AppState>, Query(params): Query<DisruptionsParams>) -> Result<Json<Value>, ApiError> {
    let data = state.repo.query_disruptions(params.hours).await?;
    let stats = state.repo.disruption_stats(params.hours).await?;

    Ok(Json(json!({
        "period_hours": params.hours,
        "count": data.len(),
        "stats": stats,
        "data": data,
    })))
}
