//! Signal Repository — the storage contract of spec.md §4.2.
//!
//! The repository presents a narrow, intention-revealing interface over a
//! relational store; callers never see a SQL connection or a query
//! builder. Resampling (§4.2 "Resolution policy") is implemented as a pure
//! function over rows already read from storage (`resolution` module) so it
//! can be unit tested without a live database.

mod postgres;
mod resolution;
mod tower_history;

pub use postgres::PostgresSignalRepository;
pub use resolution::{bucket_samples, resolve_bucket_seconds, Resolution};
pub use tower_history::{derive_tower_history, TowerChange, TowerRadio};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::types::{DisruptionEvent, EventType, NetworkQualityResult, Severity, SignalSample, SpeedtestResult};

/// Parameters for `QuerySignalHistory` (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct SignalHistoryQuery {
    pub duration_minutes: f64,
    pub resolution: String,
}

/// Aggregate counts returned by `DisruptionStats` (spec.md §4.2).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DisruptionStats {
    pub total: i64,
    pub by_type: HashMap<EventType, i64>,
    pub by_severity: HashMap<Severity, i64>,
    pub average_duration_seconds: Option<f64>,
}

/// The storage contract every core subsystem writes through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn insert_signal_history(&self, records: &[SignalSample]) -> Result<u64, StorageError>;
    async fn query_signal_history(&self, params: SignalHistoryQuery) -> Result<Vec<SignalSample>, StorageError>;
    async fn latest_signal(&self) -> Result<Option<SignalSample>, StorageError>;

    async fn insert_speedtest(&self, rec: &SpeedtestResult) -> Result<(), StorageError>;
    async fn query_speedtests(&self, limit: i64) -> Result<Vec<SpeedtestResult>, StorageError>;
    async fn latest_speedtest(&self) -> Result<Option<SpeedtestResult>, StorageError>;

    async fn insert_disruption(&self, event: &DisruptionEvent) -> Result<Uuid, StorageError>;
    async fn resolve_disruption(
        &self,
        id: Uuid,
        duration_seconds: f64,
        resolved_at: DateTime<Utc>,
        after_state: serde_json::Value,
    ) -> Result<(), StorageError>;
    async fn query_disruptions(&self, hours: f64) -> Result<Vec<DisruptionEvent>, StorageError>;
    async fn disruption_stats(&self, hours: f64) -> Result<DisruptionStats, StorageError>;

    async fn tower_history(&self, duration_minutes: f64) -> Result<Vec<TowerChange>, StorageError> {
        let rows = self
            .query_signal_history(SignalHistoryQuery {
                duration_minutes,
                resolution: "full".to_string(),
            })
            .await?;
        Ok(derive_tower_history(&rows))
    }

    async fn insert_network_quality(&self, rec: &NetworkQualityResult) -> Result<(), StorageError>;
}
