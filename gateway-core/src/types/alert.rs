use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::disruption::Severity;

/// An in-memory runtime alert (spec.md §3) — not persisted as a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub created_at: DateTime<Utc>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SignalDrop,
    SignalCritical,
    TowerChange,
    SpeedLow,
    PacketLoss,
    HighJitter,
}

/// Alert identifier.
///
/// Design note (spec.md §9, "Open questions / possibly-buggy source
/// behaviour"): the source stringifies the current millisecond timestamp,
/// so two alerts minted in the same millisecond collide. This id is instead
/// `{unix_millis}-{process_local_counter}`, where the counter is a
/// monotonically increasing `AtomicU32` — collision-free regardless of
/// clock resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub String);

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

static ALERT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl AlertId {
    /// Mint a new, process-unique id, timestamped `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let seq = ALERT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        AlertId(format!("{}-{}", now.timestamp_millis(), seq))
    }
}
