//! Route composition (spec.md §6) — one `Router<AppState>` per domain,
//! merged under `/api`, mirroring the teacher's per-domain sub-router
//! composition without the teacher's `/v1` path segment or auth layer
//! (API authentication is out of scope, spec.md §2 "Non-goals").

mod alerts;
mod disruptions;
mod events;
mod gateway_status;
mod scheduler;
mod signal;
mod speedtest;

use axum::routing::{get, post, put};
use axum::Router;

use crate::state::AppState;

fn signal_routes() -> Router<AppState> {
    Router::new()
        .route("/signal", get(signal::get_signal))
        .route("/signal/history", get(signal::get_signal_history))
}

fn speedtest_routes() -> Router<AppState> {
    Router::new().route("/speedtest", get(speedtest::get_speedtests).post(speedtest::post_speedtest))
}

fn scheduler_routes() -> Router<AppState> {
    Router::new()
        .route("/scheduler", get(scheduler::get_scheduler))
        .route("/scheduler/config", put(scheduler::put_scheduler_config))
        .route("/scheduler/start", post(scheduler::post_scheduler_start))
        .route("/scheduler/stop", post(scheduler::post_scheduler_stop))
        .route("/scheduler/run-now", post(scheduler::post_scheduler_run_now))
}

fn disruptions_routes() -> Router<AppState> {
    Router::new().route("/disruptions", get(disruptions::get_disruptions))
}

fn alerts_routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(alerts::get_alerts))
        .route("/alerts/history", get(alerts::get_alert_history))
        .route("/alerts/clear", post(alerts::post_clear_all))
        .route("/alerts/{id}/acknowledge", post(alerts::post_acknowledge))
        .route("/alerts/{id}/clear", post(alerts::post_clear))
}

fn events_routes() -> Router<AppState> {
    Router::new().route("/events", get(events::get_events))
}

fn gateway_routes() -> Router<AppState> {
    Router::new().route("/gateway/status", get(gateway_status::get_gateway_status))
}

/// Assembles every `/api/*` sub-router, the way `ferrex_server::routes::v1`
/// merges its domain groups.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(signal_routes())
                .merge(speedtest_routes())
                .merge(scheduler_routes())
                .merge(disruptions_routes())
                .merge(alerts_routes())
                .merge(events_routes())
                .merge(gateway_routes()),
        )
}
