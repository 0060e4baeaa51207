use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A typed, severity-tagged, optionally-resolved disruption (spec.md §3).
///
/// Invariant: `resolved == true` implies `duration_seconds` and
/// `resolved_at` are both set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DisruptionEvent {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub timestamp_unix: f64,

    pub event_type: EventType,
    pub severity: Severity,
    pub description: String,
    pub before_state: serde_json::Value,
    pub after_state: serde_json::Value,

    pub duration_seconds: Option<f64>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SignalDrop5g,
    SignalDrop4g,
    TowerChange5g,
    TowerChange4g,
    BandSwitch5g,
    BandSwitch4g,
    ConnectionModeChange,
    GatewayUnreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}
