//! Domain types shared across the poller, detector, alert engine, speedtest
//! orchestrator, scheduler and storage layer (spec.md §3).

mod alert;
mod disruption;
mod quality;
mod signal;
mod speedtest;

pub use alert::{Alert, AlertId, AlertType};
pub use disruption::{DisruptionEvent, EventType, Severity};
pub use quality::{NetworkQualityResult, QualityStatus};
pub use signal::{ConnectionMode, SignalSample};
pub use speedtest::{NetworkContext, SpeedtestResult, SpeedtestStatus, TriggeredBy};

/// Returns both halves of the dual timestamp every entity carries: an
/// ISO-8601 string and its unix-seconds float twin (spec.md §3).
pub fn now_timestamps() -> (chrono::DateTime<chrono::Utc>, f64) {
    let now = chrono::Utc::now();
    (now, unix_seconds(now))
}

pub fn unix_seconds(ts: chrono::DateTime<chrono::Utc>) -> f64 {
    ts.timestamp() as f64 + ts.timestamp_subsec_nanos() as f64 / 1_000_000_000.0
}
