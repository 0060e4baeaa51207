use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single network-quality probe result for one target (spec.md §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NetworkQualityResult {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub timestamp_unix: f64,

    pub target_host: String,
    pub target_name: String,

    pub ping_ms: Option<f64>,
    pub jitter_ms: f64,
    pub packet_loss_percent: f64,

    pub status: QualityStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Success,
    Error,
    Timeout,
}
