use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::{DisruptionEvent, NetworkQualityResult, SignalSample, SpeedtestResult};

use super::{DisruptionStats, SignalHistoryQuery, SignalRepository};
use super::resolution::{bucket_samples, resolve_bucket_seconds, Resolution};

/// Postgres-backed implementation of the signal repository (spec.md §4.2,
/// §6 "Storage schema").
///
/// Follows the pool-construction shape of the teacher's
/// `database::postgres::PostgresDatabase::new`: explicit `max_connections`,
/// `acquire_timeout`, and `test_before_acquire`. Unlike the teacher, queries
/// here use runtime-checked `sqlx::query`/`query_as` rather than the
/// `query!` macro family, so the crate builds without a live database or a
/// committed `.sqlx` offline cache (see DESIGN.md).
#[derive(Clone)]
pub struct PostgresSignalRepository {
    pool: PgPool,
}

impl PostgresSignalRepository {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        info!("connected to postgres storage");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    fn row_to_sample(row: &sqlx::postgres::PgRow) -> Result<SignalSample, StorageError> {
        Ok(SignalSample {
            id: row.try_get("id").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            timestamp: row.try_get("timestamp").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            timestamp_unix: row.try_get("timestamp_unix").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_sinr: row.try_get("nr_sinr").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_rsrp: row.try_get("nr_rsrp").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_rsrq: row.try_get("nr_rsrq").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_rssi: row.try_get("nr_rssi").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_bands: row.try_get("nr_bands").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_gnb_id: row.try_get("nr_gnb_id").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            nr_cid: row.try_get("nr_cid").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_sinr: row.try_get("lte_sinr").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_rsrp: row.try_get("lte_rsrp").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_rsrq: row.try_get("lte_rsrq").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_rssi: row.try_get("lte_rssi").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_bands: row.try_get("lte_bands").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_enb_id: row.try_get("lte_enb_id").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            lte_cid: row.try_get("lte_cid").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            registration_status: row.try_get("registration_status").map_err(|e| StorageError::ParseRow(e.to_string()))?,
            device_uptime: row.try_get("device_uptime").map_err(|e| StorageError::ParseRow(e.to_string()))?,
        })
    }
}

#[async_trait]
impl SignalRepository for PostgresSignalRepository {
    async fn insert_signal_history(&self, records: &[SignalSample]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO signal_history (
                    id, timestamp, timestamp_unix,
                    nr_sinr, nr_rsrp, nr_rsrq, nr_rssi, nr_bands, nr_gnb_id, nr_cid,
                    lte_sinr, lte_rsrp, lte_rsrq, lte_rssi, lte_bands, lte_enb_id, lte_cid,
                    registration_status, device_uptime
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
                "#,
            )
            .bind(record.id)
            .bind(record.timestamp)
            .bind(record.timestamp_unix)
            .bind(record.nr_sinr)
            .bind(record.nr_rsrp)
            .bind(record.nr_rsrq)
            .bind(record.nr_rssi)
            .bind(&record.nr_bands)
            .bind(record.nr_gnb_id)
            .bind(record.nr_cid)
            .bind(record.lte_sinr)
            .bind(record.lte_rsrp)
            .bind(record.lte_rsrq)
            .bind(record.lte_rssi)
            .bind(&record.lte_bands)
            .bind(record.lte_enb_id)
            .bind(record.lte_cid)
            .bind(&record.registration_status)
            .bind(record.device_uptime)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::InsertFailed(e.to_string()))?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    async fn query_signal_history(&self, params: SignalHistoryQuery) -> Result<Vec<SignalSample>, StorageError> {
        let cutoff_unix = crate::types::unix_seconds(Utc::now()) - params.duration_minutes * 60.0;

        let rows = sqlx::query(
            "SELECT * FROM signal_history WHERE timestamp_unix >= $1 ORDER BY timestamp_unix ASC",
        )
        .bind(cutoff_unix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let samples = rows
            .iter()
            .map(Self::row_to_sample)
            .collect::<Result<Vec<_>, _>>()?;

        match resolve_bucket_seconds(params.duration_minutes, &params.resolution) {
            Resolution::Full => Ok(samples),
            Resolution::Bucket(seconds) => Ok(bucket_samples(&samples, seconds)),
        }
    }

    async fn latest_signal(&self) -> Result<Option<SignalSample>, StorageError> {
        let row = sqlx::query("SELECT * FROM signal_history ORDER BY timestamp_unix DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        row.as_ref().map(Self::row_to_sample).transpose()
    }

    async fn insert_speedtest(&self, rec: &SpeedtestResult) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO speedtest_results (
                id, timestamp, timestamp_unix, download_mbps, upload_mbps, ping_ms,
                jitter_ms, packet_loss_percent, server_name, server_location, server_host,
                server_id, client_ip, isp, tool, result_url, signal_snapshot, status,
                error_message, triggered_by, network_context, pre_test_latency_ms
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22)
            "#,
        )
        .bind(rec.id)
        .bind(rec.timestamp)
        .bind(rec.timestamp_unix)
        .bind(rec.download_mbps)
        .bind(rec.upload_mbps)
        .bind(rec.ping_ms)
        .bind(rec.jitter_ms)
        .bind(rec.packet_loss_percent)
        .bind(&rec.server_name)
        .bind(&rec.server_location)
        .bind(&rec.server_host)
        .bind(&rec.server_id)
        .bind(&rec.client_ip)
        .bind(&rec.isp)
        .bind(&rec.tool)
        .bind(&rec.result_url)
        .bind(&rec.signal_snapshot)
        .bind(rec.status)
        .bind(&rec.error_message)
        .bind(rec.triggered_by)
        .bind(rec.network_context)
        .bind(rec.pre_test_latency_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::InsertFailed(e.to_string()))?;

        Ok(())
    }

    async fn query_speedtests(&self, limit: i64) -> Result<Vec<SpeedtestResult>, StorageError> {
        sqlx::query_as::<_, SpeedtestResult>(
            "SELECT * FROM speedtest_results ORDER BY timestamp_unix DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))
    }

    async fn latest_speedtest(&self) -> Result<Option<SpeedtestResult>, StorageError> {
        sqlx::query_as::<_, SpeedtestResult>(
            "SELECT * FROM speedtest_results ORDER BY timestamp_unix DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))
    }

    async fn insert_disruption(&self, event: &DisruptionEvent) -> Result<Uuid, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO disruption_events (
                id, timestamp, timestamp_unix, event_type, severity, description,
                before_state, after_state, duration_seconds, resolved, resolved_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            "#,
        )
        .bind(event.id)
        .bind(event.timestamp)
        .bind(event.timestamp_unix)
        .bind(event.event_type)
        .bind(event.severity)
        .bind(&event.description)
        .bind(&event.before_state)
        .bind(&event.after_state)
        .bind(event.duration_seconds)
        .bind(event.resolved)
        .bind(event.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::InsertFailed(e.to_string()))?;

        Ok(event.id)
    }

    async fn resolve_disruption(
        &self,
        id: Uuid,
        duration_seconds: f64,
        resolved_at: DateTime<Utc>,
        after_state: serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE disruption_events SET resolved = true, resolved_at = $2, duration_seconds = $3, after_state = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(resolved_at)
        .bind(duration_seconds)
        .bind(after_state)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::InsertFailed(e.to_string()))?;

        Ok(())
    }

    async fn query_disruptions(&self, hours: f64) -> Result<Vec<DisruptionEvent>, StorageError> {
        let cutoff_unix = crate::types::unix_seconds(Utc::now()) - hours * 3600.0;
        sqlx::query_as::<_, DisruptionEvent>(
            "SELECT * FROM disruption_events WHERE timestamp_unix >= $1 ORDER BY timestamp_unix DESC",
        )
        .bind(cutoff_unix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))
    }

    async fn disruption_stats(&self, hours: f64) -> Result<DisruptionStats, StorageError> {
        let events = self.query_disruptions(hours).await?;

        let mut stats = DisruptionStats {
            total: events.len() as i64,
            ..Default::default()
        };

        let mut duration_sum = 0.0;
        let mut duration_count = 0u32;

        for event in &events {
            *stats.by_type.entry(event.event_type).or_insert(0) += 1;
            *stats.by_severity.entry(event.severity).or_insert(0) += 1;
            if let Some(duration) = event.duration_seconds {
                duration_sum += duration;
                duration_count += 1;
            }
        }

        stats.average_duration_seconds = if duration_count > 0 {
            Some(duration_sum / duration_count as f64)
        } else {
            None
        };

        Ok(stats)
    }

    async fn insert_network_quality(&self, rec: &NetworkQualityResult) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO network_quality_results (
                id, timestamp, timestamp_unix, target_host, target_name,
                ping_ms, jitter_ms, packet_loss_percent, status, error_message
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            "#,
        )
        .bind(rec.id)
        .bind(rec.timestamp)
        .bind(rec.timestamp_unix)
        .bind(&rec.target_host)
        .bind(&rec.target_name)
        .bind(rec.ping_ms)
        .bind(rec.jitter_ms)
        .bind(rec.packet_loss_percent)
        .bind(rec.status)
        .bind(&rec.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::InsertFailed(e.to_string()))?;

        Ok(())
    }
}

// EventType/Severity/etc. need sqlx::Type + Postgres Row binding, already derived in types.
