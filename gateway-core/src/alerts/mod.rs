//! Alert Engine (spec.md §4.4) — threshold-evaluates the latest sample and
//! speedtest, maintains active/historical alerts, and fans out alert
//! lifecycle events.
//!
//! In-memory alert state has a single owner: one task holding the active map
//! and history ring, driven by a command channel (spec.md §9 "In-memory
//! alert state"). This sidesteps the reentrancy hazards of a mutex-guarded
//! map without giving up a simple method-call API — callers just send a
//! command and await the reply.

mod policy;

pub use policy::AlertPolicy;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::bus::{Bus, Subscription};
use crate::types::{Alert, AlertId, AlertType, SignalSample, SpeedtestResult};

const HISTORY_CAPACITY: usize = 1000;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    Alert(Alert),
    AlertCleared { id: AlertId },
    AllAlertsCleared { count: usize },
}

enum Command {
    Evaluate {
        sample: Option<SignalSample>,
        speedtest: Option<SpeedtestResult>,
        reply: oneshot::Sender<Vec<Alert>>,
    },
    Acknowledge {
        id: AlertId,
        reply: oneshot::Sender<bool>,
    },
    Clear {
        id: AlertId,
        reply: oneshot::Sender<bool>,
    },
    ClearAll {
        reply: oneshot::Sender<usize>,
    },
    Active {
        reply: oneshot::Sender<Vec<Alert>>,
    },
    History {
        reply: oneshot::Sender<Vec<Alert>>,
    },
}

struct State {
    policy: AlertPolicy,
    active: HashMap<AlertType, Alert>,
    history: VecDeque<Alert>,
    cooldowns: HashMap<AlertType, chrono::DateTime<Utc>>,
    bus: Arc<Bus<AlertEvent>>,
}

impl State {
    async fn evaluate(&mut self, sample: Option<&SignalSample>, speedtest: Option<&SpeedtestResult>) -> Vec<Alert> {
        let findings = policy::evaluate(&self.policy, sample, speedtest);
        let now = Utc::now();
        let mut fired = Vec::new();

        for finding in findings {
            let minutes_ago = self
                .cooldowns
                .get(&finding.alert_type)
                .map(|last| (now - *last).num_milliseconds() as f64 / 60_000.0);

            if policy::is_suppressed(&self.policy, finding.severity, minutes_ago) {
                continue;
            }
            self.cooldowns.insert(finding.alert_type, now);

            let alert = Alert {
                id: AlertId::generate(now),
                created_at: now,
                alert_type: finding.alert_type,
                severity: finding.severity,
                title: finding.title,
                message: finding.message,
                data: finding.data,
                acknowledged: false,
                acknowledged_at: None,
                resolved: false,
                resolved_at: None,
            };

            self.active.insert(alert.alert_type, alert.clone());
            self.push_history(alert.clone());
            self.bus.publish(AlertEvent::Alert(alert.clone())).await;
            fired.push(alert);
        }

        fired
    }

    fn push_history(&mut self, alert: Alert) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(alert);
    }

    fn acknowledge(&mut self, id: &AlertId) -> bool {
        let now = Utc::now();
        let mut found = false;
        for alert in self.active.values_mut() {
            if &alert.id == id {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(now);
                found = true;
            }
        }
        for alert in self.history.iter_mut() {
            if &alert.id == id {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(now);
                found = true;
            }
        }
        found
    }

    async fn clear(&mut self, id: &AlertId) -> bool {
        let key = self.active.iter().find(|(_, a)| &a.id == id).map(|(k, _)| *k);
        match key {
            Some(key) => {
                self.active.remove(&key);
                self.bus.publish(AlertEvent::AlertCleared { id: id.clone() }).await;
                true
            }
            None => false,
        }
    }

    async fn clear_all(&mut self) -> usize {
        let count = self.active.len();
        self.active.clear();
        self.bus.publish(AlertEvent::AllAlertsCleared { count }).await;
        count
    }
}

async fn run_actor(mut commands: mpsc::Receiver<Command>, mut state: State) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Evaluate { sample, speedtest, reply } => {
                let fired = state.evaluate(sample.as_ref(), speedtest.as_ref()).await;
                let _ = reply.send(fired);
            }
            Command::Acknowledge { id, reply } => {
                let _ = reply.send(state.acknowledge(&id));
            }
            Command::Clear { id, reply } => {
                let _ = reply.send(state.clear(&id).await);
            }
            Command::ClearAll { reply } => {
                let _ = reply.send(state.clear_all().await);
            }
            Command::Active { reply } => {
                let _ = reply.send(state.active.values().cloned().collect());
            }
            Command::History { reply } => {
                let _ = reply.send(state.history.iter().cloned().collect());
            }
        }
    }
}

/// Handle to the running Alert Engine actor. Cloneable: every clone sends
/// commands to the same task.
#[derive(Clone)]
pub struct AlertEngine {
    commands: mpsc::Sender<Command>,
    bus: Arc<Bus<AlertEvent>>,
}

impl AlertEngine {
    pub fn new(policy: AlertPolicy) -> Self {
        let bus = Arc::new(Bus::new(BUS_CAPACITY));
        let (tx, rx) = mpsc::channel(256);
        let state = State {
            policy,
            active: HashMap::new(),
            history: VecDeque::new(),
            cooldowns: HashMap::new(),
            bus: bus.clone(),
        };
        tokio::spawn(run_actor(rx, state));

        Self { commands: tx, bus }
    }

    pub async fn evaluate(&self, sample: Option<SignalSample>, speedtest: Option<SpeedtestResult>) -> Vec<Alert> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Evaluate { sample, speedtest, reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn acknowledge(&self, id: AlertId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Acknowledge { id, reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn clear(&self, id: AlertId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Clear { id, reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn clear_all(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::ClearAll { reply }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn active(&self) -> Vec<Alert> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Active { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn history(&self) -> Vec<Alert> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::History { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Fan-out subscription that interleaves bus events with a synthesized
    /// 30-second heartbeat (spec.md §4.4 "Subscription semantics").
    pub async fn subscribe(&self) -> AlertSubscription {
        AlertSubscription {
            inner: self.bus.subscribe().await,
            heartbeat: tokio::time::interval(HEARTBEAT_INTERVAL),
        }
    }
}

/// A subscriber-side wrapper around the alert bus: every `recv()` is either
/// the next published event or a heartbeat tick, whichever comes first.
pub struct AlertSubscription {
    inner: Subscription<AlertEvent>,
    heartbeat: tokio::time::Interval,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionItem {
    Alert(Alert),
    AlertCleared { id: AlertId },
    AllAlertsCleared { count: usize },
    Heartbeat,
}

impl AlertSubscription {
    pub async fn recv(&mut self) -> SubscriptionItem {
        tokio::select! {
            event = self.inner.recv() => match event {
                AlertEvent::Alert(alert) => SubscriptionItem::Alert(alert),
                AlertEvent::AlertCleared { id } => SubscriptionItem::AlertCleared { id },
                AlertEvent::AllAlertsCleared { count } => SubscriptionItem::AllAlertsCleared { count },
            },
            _ = self.heartbeat.tick() => SubscriptionItem::Heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(nr_sinr: Option<f64>) -> SignalSample {
        SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: 0.0,
            nr_sinr,
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
        }
    }

    #[tokio::test]
    async fn evaluate_fires_and_records_active_alert() {
        let engine = AlertEngine::new(AlertPolicy::default());
        let fired = engine.evaluate(Some(sample(Some(-8.0))), None).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(engine.active().await.len(), 1);
    }

    #[tokio::test]
    async fn at_most_one_active_alert_per_type() {
        let engine = AlertEngine::new(AlertPolicy::default());
        engine.evaluate(Some(sample(Some(-8.0))), None).await;
        // cooldown suppresses the second evaluation for the same type.
        engine.evaluate(Some(sample(Some(-9.0))), None).await;
        assert_eq!(engine.active().await.len(), 1);
    }

    #[tokio::test]
    async fn clear_all_empties_active_and_reports_count() {
        let engine = AlertEngine::new(AlertPolicy::default());
        engine.evaluate(Some(sample(Some(-8.0))), None).await;
        let count = engine.clear_all().await;
        assert_eq!(count, 1);
        assert!(engine.active().await.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_stamps_active_and_history_entries() {
        let engine = AlertEngine::new(AlertPolicy::default());
        let fired = engine.evaluate(Some(sample(Some(-8.0))), None).await;
        let id = fired[0].id.clone();
        assert!(engine.acknowledge(id).await);
        assert!(engine.active().await[0].acknowledged);
        assert!(engine.history().await[0].acknowledged);
    }

    #[tokio::test]
    async fn warning_suppressed_when_disabled_in_policy() {
        let mut policy = AlertPolicy::default();
        policy.notify_on_warning = false;
        let engine = AlertEngine::new(policy);
        let fired = engine.evaluate(Some(sample(Some(-2.0))), None).await;
        assert!(fired.is_empty());
    }
}
