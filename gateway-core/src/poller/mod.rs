//! Gateway Poller (spec.md §4.1) — periodic fetch, circuit breaker, outage
//! lifecycle, signal/outage fan-out and batched persistence.

mod batch_writer;
mod circuit_breaker;
mod client;

pub use batch_writer::{BatchWriter, BatchWriterConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{parse_gateway_payload, GatewayClient};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{Bus, Subscription};
use crate::error::{GatewayError, Result};
use crate::storage::SignalRepository;
use crate::types::{DisruptionEvent, EventType, Severity, SignalSample};

pub struct PollerConfig {
    pub host: String,
    pub port: u16,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub sinr_drop_threshold_db: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.1".to_string(),
            port: 80,
            poll_interval: Duration::from_millis(2000),
            timeout: Duration::from_secs_f64(2.0),
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            sinr_drop_threshold_db: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollerStats {
    pub success_count: u64,
    pub error_count: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub running: bool,
    pub circuit_state: CircuitState,
}

/// An outage's `closed -> open -> closed` lifecycle event, published on the
/// outage stream (spec.md §4.1 "Outage lifecycle").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutageEvent {
    Started { started_at: DateTime<Utc> },
    Resolved { duration_seconds: f64, resolved_at: DateTime<Utc> },
}

struct ActiveOutage {
    started_at: DateTime<Utc>,
    disruption_id: Uuid,
    error_count: u64,
}

struct PollState {
    current_sample: Option<SignalSample>,
    current_raw: Option<serde_json::Value>,
    success_count: u64,
    error_count: u64,
    last_success_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Periodically fetches, decodes, and fans out gateway samples, backed by a
/// circuit breaker, outage lifecycle tracking and a batched persistence path.
pub struct GatewayPoller<R: SignalRepository + 'static> {
    client: GatewayClient,
    repo: Arc<R>,
    config: PollerConfig,
    breaker: Mutex<CircuitBreaker>,
    state: RwLock<PollState>,
    outage: Mutex<Option<ActiveOutage>>,
    signal_bus: Bus<SignalSample>,
    outage_bus: Bus<OutageEvent>,
    writer: Arc<BatchWriter<R>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    poll_generation: AtomicU64,
}

impl<R: SignalRepository + 'static> GatewayPoller<R> {
    pub fn new(config: PollerConfig, repo: Arc<R>) -> Arc<Self> {
        let client = GatewayClient::new(&config.host, config.port, config.timeout);
        let breaker = CircuitBreaker::new(config.failure_threshold, config.recovery_timeout);
        let writer = BatchWriter::new(repo.clone(), BatchWriterConfig::default());

        Arc::new(Self {
            client,
            repo,
            config,
            breaker: Mutex::new(breaker),
            state: RwLock::new(PollState {
                current_sample: None,
                current_raw: None,
                success_count: 0,
                error_count: 0,
                last_success_at: None,
                last_attempt_at: None,
                last_error: None,
            }),
            outage: Mutex::new(None),
            signal_bus: Bus::new(64),
            outage_bus: Bus::new(16),
            writer,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            writer_task: Mutex::new(None),
            poll_generation: AtomicU64::new(0),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Idempotent: begins the background polling task if not already running.
    pub async fn start_polling(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        *self.writer_task.lock().await = Some(self.writer.spawn());

        let poller = Arc::clone(self);
        let generation = self.poll_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.config.poll_interval);
            loop {
                ticker.tick().await;
                if !poller.running.load(Ordering::Acquire) || poller.poll_generation.load(Ordering::Acquire) != generation {
                    break;
                }
                // Polls never overlap: this loop awaits each poll fully
                // before the next tick is consumed.
                let _ = poller.poll_once().await;
            }
        });
        *self.task.lock().await = Some(handle);
    }

    /// Idempotent: interrupts the background task and flushes the write batch.
    pub async fn stop_polling(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.poll_generation.fetch_add(1, Ordering::AcqRel);

        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.writer.stop().await;
        if let Some(handle) = self.writer_task.lock().await.take() {
            handle.abort();
        }
    }

    /// Manual single poll, honored even while the background task is running.
    pub async fn poll_once(&self) -> Result<SignalSample> {
        let now = Utc::now();
        {
            let mut state = self.state.write().await;
            state.last_attempt_at = Some(now);
        }

        let allowed = {
            let mut breaker = self.breaker.lock().await;
            breaker.allow_call()
        };
        if !allowed {
            return Err(GatewayError::CircuitOpen);
        }

        match self.client.fetch().await {
            Ok((sample, raw)) => {
                self.on_poll_success(sample.clone(), raw).await;
                Ok(sample)
            }
            Err(e) => {
                self.on_poll_failure(&e).await;
                Err(e)
            }
        }
    }

    async fn on_poll_success(&self, sample: SignalSample, raw: serde_json::Value) {
        let prev = {
            let mut state = self.state.write().await;
            let prev = state.current_sample.take();
            state.success_count += 1;
            state.last_success_at = Some(sample.timestamp);
            state.current_sample = Some(sample.clone());
            state.current_raw = Some(raw);
            prev
        };

        let just_resolved = {
            let mut breaker = self.breaker.lock().await;
            let was_open = breaker.state() != CircuitState::Closed;
            breaker.record_success();
            was_open
        };
        if just_resolved {
            self.resolve_outage(&sample).await;
        }

        if let Some(prev) = prev {
            warn_on_sinr_drop(&prev, &sample, self.config.sinr_drop_threshold_db);
        }

        self.signal_bus.publish(sample.clone()).await;
        self.writer.enqueue(sample).await;
    }

    async fn on_poll_failure(&self, err: &GatewayError) {
        let mut state = self.state.write().await;
        state.error_count += 1;
        state.last_error = Some(err.to_string());
        drop(state);

        let just_opened = {
            let mut breaker = self.breaker.lock().await;
            breaker.record_failure()
        };
        if just_opened {
            self.start_outage().await;
        } else {
            let mut outage = self.outage.lock().await;
            if let Some(active) = outage.as_mut() {
                active.error_count += 1;
            }
        }
    }

    async fn start_outage(&self) {
        let started_at = Utc::now();
        let disruption = DisruptionEvent {
            id: Uuid::new_v4(),
            timestamp: started_at,
            timestamp_unix: crate::types::unix_seconds(started_at),
            event_type: EventType::GatewayUnreachable,
            severity: Severity::Critical,
            description: "gateway became unreachable".to_string(),
            before_state: json!({}),
            after_state: json!({}),
            duration_seconds: None,
            resolved: false,
            resolved_at: None,
        };

        let disruption_id = match self.repo.insert_disruption(&disruption).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to persist gateway_unreachable disruption");
                disruption.id
            }
        };

        *self.outage.lock().await = Some(ActiveOutage {
            started_at,
            disruption_id,
            error_count: 1,
        });
        info!(started_at = %started_at, "gateway outage started");
        self.outage_bus.publish(OutageEvent::Started { started_at }).await;
    }

    async fn resolve_outage(&self, recovered_sample: &SignalSample) {
        let Some(active) = self.outage.lock().await.take() else {
            return;
        };
        let resolved_at = recovered_sample.timestamp;
        let duration_seconds = (resolved_at - active.started_at).num_milliseconds() as f64 / 1000.0;

        if let Err(e) = self
            .repo
            .resolve_disruption(
                active.disruption_id,
                duration_seconds,
                resolved_at,
                json!({ "error_count": active.error_count }),
            )
            .await
        {
            warn!(error = %e, "failed to mark gateway_unreachable disruption resolved");
        }

        info!(duration_seconds, "gateway outage resolved");
        self.outage_bus
            .publish(OutageEvent::Resolved { duration_seconds, resolved_at })
            .await;
    }

    pub async fn current_data(&self) -> Option<SignalSample> {
        self.state.read().await.current_sample.clone()
    }

    pub async fn current_raw(&self) -> Option<serde_json::Value> {
        self.state.read().await.current_raw.clone()
    }

    pub async fn stats(&self) -> PollerStats {
        let state = self.state.read().await;
        let circuit_state = self.breaker.lock().await.state();
        PollerStats {
            success_count: state.success_count,
            error_count: state.error_count,
            last_success_at: state.last_success_at,
            last_attempt_at: state.last_attempt_at,
            last_error: state.last_error.clone(),
            running: self.is_running(),
            circuit_state,
        }
    }

    pub async fn subscribe(&self) -> Subscription<SignalSample> {
        self.signal_bus.subscribe().await
    }

    pub async fn subscribe_outages(&self) -> Subscription<OutageEvent> {
        self.outage_bus.subscribe().await
    }
}

/// Log-only SINR drop check (spec.md §4.1 step 2). Does not create any
/// persisted event — that is the Disruption Detector's responsibility.
fn warn_on_sinr_drop(prev: &SignalSample, curr: &SignalSample, threshold_db: f64) {
    if let (Some(p), Some(c)) = (prev.nr_sinr, curr.nr_sinr) {
        if p - c >= threshold_db {
            warn!(radio = "5g", drop_db = p - c, "SINR drop exceeds threshold");
        }
    }
    if let (Some(p), Some(c)) = (prev.lte_sinr, curr.lte_sinr) {
        if p - c >= threshold_db {
            warn!(radio = "4g", drop_db = p - c, "SINR drop exceeds threshold");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::*;
    use crate::types::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn poller() -> Arc<GatewayPoller<MockSignalRepository>> {
        let mut repo = MockSignalRepository::new();
        repo.expect_insert_signal_history().returning(|records| Ok(records.len() as u64));
        GatewayPoller::new(PollerConfig::default(), Arc::new(repo))
    }

    type ResolvedLog = Arc<StdMutex<Vec<(Uuid, f64)>>>;

    fn poller_tracking_disruptions() -> (Arc<GatewayPoller<MockSignalRepository>>, Arc<AtomicUsize>, ResolvedLog) {
        let disruptions_inserted = Arc::new(AtomicUsize::new(0));
        let resolved: Arc<StdMutex<Vec<(Uuid, f64)>>> = Arc::new(StdMutex::new(Vec::new()));
        let inserted = disruptions_inserted.clone();
        let resolved_writes = resolved.clone();

        let mut repo = MockSignalRepository::new();
        repo.expect_insert_signal_history().returning(|records| Ok(records.len() as u64));
        repo.expect_insert_disruption().returning(move |event| {
            inserted.fetch_add(1, Ordering::SeqCst);
            Ok(event.id)
        });
        repo.expect_resolve_disruption().returning(move |id, duration_seconds, _, _| {
            resolved_writes.lock().unwrap().push((id, duration_seconds));
            Ok(())
        });

        (GatewayPoller::new(PollerConfig::default(), Arc::new(repo)), disruptions_inserted, resolved)
    }

    #[tokio::test]
    async fn failure_then_success_opens_and_resolves_an_outage() {
        let (poller, disruptions_inserted, resolved) = poller_tracking_disruptions();

        for _ in 0..3 {
            poller.on_poll_failure(&GatewayError::Transport(crate::error::TransportError::Timeout)).await;
        }
        assert_eq!(poller.breaker.lock().await.state(), CircuitState::Open);
        assert_eq!(disruptions_inserted.load(Ordering::SeqCst), 1);
        assert!(poller.outage.lock().await.is_some());

        let sample = SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: 0.0,
            nr_sinr: None,
            nr_rsrp: None,
            nr_rsrq: None,
            nr_rssi: None,
            nr_bands: None,
            nr_gnb_id: None,
            nr_cid: None,
            lte_sinr: None,
            lte_rsrp: None,
            lte_rsrq: None,
            lte_rssi: None,
            lte_bands: None,
            lte_enb_id: None,
            lte_cid: None,
            registration_status: None,
            device_uptime: None,
        };
        poller.on_poll_success(sample, json!({})).await;
        assert!(poller.outage.lock().await.is_none());
        assert_eq!(resolved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_stop_polling_is_idempotent() {
        let poller = poller();
        poller.start_polling().await;
        poller.start_polling().await;
        assert!(poller.is_running());
        poller.stop_polling().await;
        poller.stop_polling().await;
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn stats_reflect_success_and_error_counters() {
        let poller = poller();
        let sample = SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: 0.0,
            nr_sinr: Some(5.0),
            nr_rsrp: None,
            nr_rsrq: None,
            nr_rssi: None,
            nr_bands: None,
            nr_gnb_id: None,
            nr_cid: None,
            lte_sinr: None,
            lte_rsrp: None,
            lte_rsrq: None,
            lte_rssi: None,
            lte_bands: None,
            lte_enb_id: None,
            lte_cid: None,
            registration_status: None,
            device_uptime: None,
        };
        poller.on_poll_success(sample.clone(), json!({})).await;
        poller.on_poll_success(sample, json!({})).await;
        let stats = poller.stats().await;
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.circuit_state, CircuitState::Closed);
    }
}
