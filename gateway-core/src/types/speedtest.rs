use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single speedtest invocation (spec.md §3).
///
/// Invariant: when `status` is not `Success`, speed fields are zero and
/// `error_message` is populated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeedtestResult {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub timestamp_unix: f64,

    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub jitter_ms: Option<f64>,
    pub packet_loss_percent: Option<f64>,

    pub server_name: Option<String>,
    pub server_location: Option<String>,
    pub server_host: Option<String>,
    pub server_id: Option<String>,
    pub client_ip: Option<String>,
    pub isp: Option<String>,

    pub tool: String,
    pub result_url: Option<String>,
    pub signal_snapshot: Option<serde_json::Value>,

    pub status: SpeedtestStatus,
    pub error_message: Option<String>,
    pub triggered_by: TriggeredBy,
    pub network_context: NetworkContext,
    pub pre_test_latency_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SpeedtestStatus {
    Success,
    Error,
    Timeout,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Manual,
    Scheduler,
    Api,
}

/// Coarse classification of ambient network load at speed-test time
/// (spec.md GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NetworkContext {
    Baseline,
    Idle,
    Light,
    Busy,
    Unknown,
}
