//! Disruption Detector (spec.md §4.3) — converts adjacent sample pairs into
//! typed, cooldown-suppressed `DisruptionEvent` rows.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::SignalRepository;
use crate::types::{ConnectionMode, DisruptionEvent, EventType, Severity, SignalSample};

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub sinr_drop_5g_db: f64,
    pub sinr_drop_4g_db: f64,
    pub critical_escalation_db: f64,
    pub cooldown_seconds: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sinr_drop_5g_db: 10.0,
            sinr_drop_4g_db: 10.0,
            critical_escalation_db: 20.0,
            cooldown_seconds: 60.0,
        }
    }
}

/// One fired detector rule, prior to cooldown suppression.
struct Candidate {
    event_type: EventType,
    severity: Severity,
    description: String,
    before_state: serde_json::Value,
    after_state: serde_json::Value,
}

/// Converts `(previous, current)` sample pairs into persisted disruption
/// events, with one cooldown timestamp per event type.
pub struct DisruptionDetector<R: SignalRepository> {
    repo: std::sync::Arc<R>,
    config: DetectorConfig,
    cooldowns: Mutex<HashMap<EventType, DateTime<Utc>>>,
}

impl<R: SignalRepository> DisruptionDetector<R> {
    pub fn new(repo: std::sync::Arc<R>, config: DetectorConfig) -> Self {
        Self {
            repo,
            config,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Run every detector rule against `(prev, curr)` and persist every
    /// candidate that survives cooldown suppression, in rule order.
    pub async fn process(&self, prev: &SignalSample, curr: &SignalSample) -> Result<Vec<Uuid>, StorageError> {
        let candidates = detect(prev, curr, &self.config);
        let now = Utc::now();
        let mut ids = Vec::new();

        for candidate in candidates {
            if !self.passes_cooldown(candidate.event_type, now) {
                continue;
            }

            let event = DisruptionEvent {
                id: Uuid::new_v4(),
                timestamp: now,
                timestamp_unix: crate::types::unix_seconds(now),
                event_type: candidate.event_type,
                severity: candidate.severity,
                description: candidate.description,
                before_state: candidate.before_state,
                after_state: candidate.after_state,
                duration_seconds: None,
                resolved: false,
                resolved_at: None,
            };
            ids.push(self.repo.insert_disruption(&event).await?);
        }

        Ok(ids)
    }

    /// Cooldown is set regardless of whether persistence later succeeds
    /// (spec.md §4.3 "Otherwise fire and set the cooldown stamp to now").
    fn passes_cooldown(&self, event_type: EventType, now: DateTime<Utc>) -> bool {
        let mut cooldowns = self.cooldowns.lock().unwrap();
        let elapsed_ok = cooldowns
            .get(&event_type)
            .map(|last| (now - *last).num_milliseconds() as f64 / 1000.0 >= self.config.cooldown_seconds)
            .unwrap_or(true);
        if elapsed_ok {
            cooldowns.insert(event_type, now);
        }
        elapsed_ok
    }
}

fn detect(prev: &SignalSample, curr: &SignalSample, config: &DetectorConfig) -> Vec<Candidate> {
    let mut out = Vec::new();

    if let (Some(p), Some(c)) = (prev.nr_sinr, curr.nr_sinr) {
        let drop = p - c;
        if drop >= config.sinr_drop_5g_db {
            let severity = if drop >= config.critical_escalation_db { Severity::Critical } else { Severity::Warning };
            out.push(Candidate {
                event_type: EventType::SignalDrop5g,
                severity,
                description: format!("5G NR SINR dropped {drop:.1} dB"),
                before_state: json!({ "nr_sinr": p }),
                after_state: json!({ "nr_sinr": c }),
            });
        }
    }

    if let (Some(p), Some(c)) = (prev.lte_sinr, curr.lte_sinr) {
        let drop = p - c;
        if drop >= config.sinr_drop_4g_db {
            out.push(Candidate {
                event_type: EventType::SignalDrop4g,
                severity: Severity::Warning,
                description: format!("4G LTE SINR dropped {drop:.1} dB"),
                before_state: json!({ "lte_sinr": p }),
                after_state: json!({ "lte_sinr": c }),
            });
        }
    }

    if let (Some(p), Some(c)) = (prev.nr_gnb_id, curr.nr_gnb_id) {
        if p != c {
            out.push(Candidate {
                event_type: EventType::TowerChange5g,
                severity: Severity::Info,
                description: "5G gNB id changed".to_string(),
                before_state: json!({ "nr_gnb_id": p }),
                after_state: json!({ "nr_gnb_id": c }),
            });
        }
    }

    if let (Some(p), Some(c)) = (prev.lte_enb_id, curr.lte_enb_id) {
        if p != c {
            out.push(Candidate {
                event_type: EventType::TowerChange4g,
                severity: Severity::Info,
                description: "4G eNB id changed".to_string(),
                before_state: json!({ "lte_enb_id": p }),
                after_state: json!({ "lte_enb_id": c }),
            });
        }
    }

    if let (Some(p), Some(c)) = (&prev.nr_bands, &curr.nr_bands) {
        if p != c {
            out.push(Candidate {
                event_type: EventType::BandSwitch5g,
                severity: Severity::Info,
                description: "5G band set changed".to_string(),
                before_state: json!({ "nr_bands": p }),
                after_state: json!({ "nr_bands": c }),
            });
        }
    }

    if let (Some(p), Some(c)) = (&prev.lte_bands, &curr.lte_bands) {
        if p != c {
            out.push(Candidate {
                event_type: EventType::BandSwitch4g,
                severity: Severity::Info,
                description: "4G band set changed".to_string(),
                before_state: json!({ "lte_bands": p }),
                after_state: json!({ "lte_bands": c }),
            });
        }
    }

    let prev_mode = prev.connection_mode();
    let curr_mode = curr.connection_mode();
    if prev_mode != curr_mode {
        let severity = if curr_mode == ConnectionMode::NoSignal {
            Severity::Critical
        } else if matches!(prev_mode, ConnectionMode::Sa | ConnectionMode::Nsa) && curr_mode == ConnectionMode::Lte {
            Severity::Warning
        } else {
            Severity::Info
        };
        out.push(Candidate {
            event_type: EventType::ConnectionModeChange,
            severity,
            description: format!("connection mode changed from {prev_mode} to {curr_mode}"),
            before_state: json!({ "connection_mode": prev_mode.as_str() }),
            after_state: json!({ "connection_mode": curr_mode.as_str() }),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::*;
    use crate::types::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_repo() -> (MockSignalRepository, Arc<AtomicUsize>) {
        let inserted = Arc::new(AtomicUsize::new(0));
        let counted = inserted.clone();
        let mut repo = MockSignalRepository::new();
        repo.expect_insert_disruption().returning(move |event| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(event.id)
        });
        (repo, inserted)
    }

    fn sample(nr_sinr: Option<f64>, lte_sinr: Option<f64>, nr_gnb_id: Option<i64>) -> SignalSample {
        SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: 0.0,
            nr_sinr,
            nr_rsrp: None,
            nr_rsrq: None,
            nr_rssi: None,
            nr_bands: None,
            nr_gnb_id,
            nr_cid: None,
            lte_sinr,
            lte_rsrp: None,
            lte_rsrq: None,
            lte_rssi: None,
            lte_bands: None,
            lte_enb_id: None,
            lte_cid: None,
            registration_status: None,
            device_uptime: None,
        }
    }

    #[test]
    fn sinr_drop_5g_escalates_to_critical_at_20db() {
        let prev = sample(Some(20.0), None, None);
        let curr = sample(Some(-1.0), None, None);
        let candidates = detect(&prev, &curr, &DetectorConfig::default());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].event_type, EventType::SignalDrop5g);
        assert_eq!(candidates[0].severity, Severity::Critical);
    }

    #[test]
    fn sinr_drop_5g_stays_warning_below_20db() {
        let prev = sample(Some(20.0), None, None);
        let curr = sample(Some(9.0), None, None);
        let candidates = detect(&prev, &curr, &DetectorConfig::default());
        assert_eq!(candidates[0].severity, Severity::Warning);
    }

    #[test]
    fn sinr_drop_4g_is_always_warning_regardless_of_magnitude() {
        let prev = sample(None, Some(30.0), None);
        let curr = sample(None, Some(-20.0), None);
        let candidates = detect(&prev, &curr, &DetectorConfig::default());
        assert_eq!(candidates[0].event_type, EventType::SignalDrop4g);
        assert_eq!(candidates[0].severity, Severity::Warning);
    }

    #[test]
    fn drop_exactly_at_threshold_fires() {
        let prev = sample(Some(20.0), None, None);
        let curr = sample(Some(10.0), None, None);
        let candidates = detect(&prev, &curr, &DetectorConfig::default());
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn tower_change_5g_fires_on_gnb_id_change() {
        let prev = sample(None, None, Some(1));
        let curr = sample(None, None, Some(2));
        let candidates = detect(&prev, &curr, &DetectorConfig::default());
        assert!(candidates.iter().any(|c| c.event_type == EventType::TowerChange5g));
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeated_fires_of_the_same_type() {
        let (repo, inserted) = counting_repo();
        let detector = DisruptionDetector::new(Arc::new(repo), DetectorConfig::default());
        let prev = sample(Some(20.0), None, None);
        let curr = sample(Some(5.0), None, None);

        for _ in 0..3 {
            detector.process(&prev, &curr).await.unwrap();
        }
        assert_eq!(inserted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_mode_downgrade_to_no_signal_is_critical() {
        let prev = sample(Some(10.0), None, None);
        let curr = sample(None, None, None);
        let candidates = detect(&prev, &curr, &DetectorConfig::default());
        let mode_change = candidates.iter().find(|c| c.event_type == EventType::ConnectionModeChange).unwrap();
        assert_eq!(mode_change.severity, Severity::Critical);
    }
}
