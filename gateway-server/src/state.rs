//! Shared application state handed to every handler (spec.md §6, §9).

use std::sync::Arc;

use gateway_core::alerts::AlertEngine;
use gateway_core::poller::GatewayPoller;
use gateway_core::scheduler::Scheduler;
use gateway_core::speedtest::SpeedtestOrchestrator;
use gateway_core::storage::PostgresSignalRepository;

/// The detector and quality prober have no HTTP surface (spec.md §6's route
/// table names none for either) — they run their own background loops and
/// never need a handle from a request handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<PostgresSignalRepository>,
    pub poller: Arc<GatewayPoller<PostgresSignalRepository>>,
    pub alerts: AlertEngine,
    pub speedtest: Arc<SpeedtestOrchestrator<PostgresSignalRepository>>,
    pub scheduler: Arc<Scheduler<PostgresSignalRepository>>,
}
