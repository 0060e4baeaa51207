//! Network Quality Prober (spec.md §4.7) — periodically pings a set of
//! targets and derives latency, jitter and packet loss.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::StorageError;
use crate::storage::SignalRepository;
use crate::types::{NetworkQualityResult, QualityStatus};

/// One probe target (spec.md §4.7 "Periodically ping a set of targets").
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub host: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub echo_count: u32,
    pub per_echo_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { echo_count: 20, per_echo_timeout: Duration::from_secs(5) }
    }
}

/// Raw RTT observations from one `ping` invocation.
#[derive(Debug, Clone, Default)]
pub struct PingStats {
    pub sent: u32,
    pub received: u32,
    pub rtts_ms: Vec<f64>,
}

impl PingStats {
    pub fn latency_ms(&self) -> Option<f64> {
        mean(&self.rtts_ms)
    }

    /// Mean absolute deviation of the observed RTTs.
    pub fn jitter_ms(&self) -> f64 {
        let Some(mean) = mean(&self.rtts_ms) else { return 0.0 };
        if self.rtts_ms.is_empty() {
            return 0.0;
        }
        self.rtts_ms.iter().map(|rtt| (rtt - mean).abs()).sum::<f64>() / self.rtts_ms.len() as f64
    }

    pub fn packet_loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        ((self.sent - self.received) as f64 / self.sent as f64 * 100.0).clamp(0.0, 100.0)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn rtt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Matches the common "time=12.3 ms" / "time<1ms" textual forms shared by
    // Linux and BSD/macOS ping output.
    RE.get_or_init(|| Regex::new(r"time[=<]([0-9.]+)\s*ms").unwrap())
}

fn transmitted_received_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+(?:packets\s+)?transmitted,\s*(\d+)\s+(?:packets\s+)?received").unwrap())
}

/// Spawn the OS `ping` utility against `host` and parse its textual output.
/// On subprocess timeout the child is killed and the partial stats (if any)
/// are returned rather than an error — mirrors how a missed echo degrades
/// the stats rather than failing the whole probe.
pub async fn ping(host: &str, config: ProbeConfig) -> PingStats {
    let deadline = config.per_echo_timeout * config.echo_count.max(1) + Duration::from_secs(1);

    let spawn = Command::new("ping")
        .arg("-c")
        .arg(config.echo_count.to_string())
        .arg("-W")
        .arg(config.per_echo_timeout.as_secs().max(1).to_string())
        .arg(host)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    let output = match tokio::time::timeout(deadline, spawn).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(error = %e, host, "failed to spawn ping");
            return PingStats::default();
        }
        Err(_) => {
            warn!(host, "ping timed out");
            return PingStats::default();
        }
    };

    parse_ping_output(&String::from_utf8_lossy(&output.stdout), config.echo_count)
}

fn parse_ping_output(text: &str, echo_count: u32) -> PingStats {
    let rtts_ms: Vec<f64> = rtt_regex().captures_iter(text).filter_map(|c| c[1].parse().ok()).collect();

    if let Some(caps) = transmitted_received_regex().captures(text) {
        let sent: u32 = caps[1].parse().unwrap_or(echo_count);
        let received: u32 = caps[2].parse().unwrap_or(rtts_ms.len() as u32);
        return PingStats { sent, received, rtts_ms };
    }

    PingStats { sent: echo_count, received: rtts_ms.len() as u32, rtts_ms }
}

pub struct NetworkQualityProber<R: SignalRepository + 'static> {
    repo: Arc<R>,
    config: ProbeConfig,
    targets: Vec<ProbeTarget>,
    interval: Duration,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: SignalRepository + 'static> NetworkQualityProber<R> {
    pub fn new(repo: Arc<R>, config: ProbeConfig, targets: Vec<ProbeTarget>, interval: Duration) -> Self {
        Self { repo, config, targets, interval, running: AtomicBool::new(false), task: Mutex::new(None) }
    }

    /// Probe one target and persist the result.
    pub async fn probe_target(&self, target_host: &str, target_name: &str) -> Result<NetworkQualityResult, StorageError> {
        let stats = ping(target_host, self.config).await;
        let now = chrono::Utc::now();

        let status = if stats.rtts_ms.is_empty() { QualityStatus::Error } else { QualityStatus::Success };
        let result = NetworkQualityResult {
            id: uuid::Uuid::new_v4(),
            timestamp: now,
            timestamp_unix: crate::types::unix_seconds(now),
            target_host: target_host.to_string(),
            target_name: target_name.to_string(),
            ping_ms: stats.latency_ms(),
            jitter_ms: stats.jitter_ms(),
            packet_loss_percent: stats.packet_loss_percent(),
            status,
            error_message: if stats.rtts_ms.is_empty() { Some("no echo replies received".to_string()) } else { None },
        };

        self.repo.insert_network_quality(&result).await?;
        Ok(result)
    }

    /// Probe every configured target once, logging (not propagating)
    /// per-target storage errors so one bad target never blocks the rest.
    pub async fn probe_all(&self) {
        for target in &self.targets {
            if let Err(e) = self.probe_target(&target.host, &target.name).await {
                warn!(error = %e, target = %target.name, "network quality probe failed to persist");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the periodic probe loop (spec.md §4.7 "periodically ping a set
    /// of targets"), mirroring the poller/scheduler start/stop texture.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let prober = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(prober.interval);
            loop {
                ticker.tick().await;
                if !prober.running.load(Ordering::Acquire) {
                    break;
                }
                prober.probe_all().await;
            }
        });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_style_ping_output() {
        let text = "\
64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms
64 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=14.1 ms
--- 1.1.1.1 ping statistics ---
2 packets transmitted, 2 received, 0% packet loss, time 1001ms
";
        let stats = parse_ping_output(text, 2);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.received, 2);
        assert_eq!(stats.rtts_ms, vec![12.3, 14.1]);
        assert_eq!(stats.packet_loss_percent(), 0.0);
    }

    #[test]
    fn full_loss_yields_100_percent_and_no_latency() {
        let text = "4 packets transmitted, 0 received, 100% packet loss";
        let stats = parse_ping_output(text, 4);
        assert_eq!(stats.packet_loss_percent(), 100.0);
        assert_eq!(stats.latency_ms(), None);
    }

    #[test]
    fn jitter_is_mean_absolute_deviation() {
        let stats = PingStats { sent: 3, received: 3, rtts_ms: vec![10.0, 10.0, 40.0] };
        // mean = 20, deviations = 10,10,20 -> mean = 13.33
        assert!((stats.jitter_ms() - 13.333).abs() < 0.01);
    }

    #[test]
    fn missing_transmitted_received_line_falls_back_to_echo_count() {
        let stats = parse_ping_output("time=5.0 ms\ntime=6.0 ms\n", 5);
        assert_eq!(stats.sent, 5);
        assert_eq!(stats.received, 2);
    }

    use crate::storage::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_repo() -> (MockSignalRepository, Arc<AtomicUsize>) {
        let inserted = Arc::new(AtomicUsize::new(0));
        let counted = inserted.clone();
        let mut repo = MockSignalRepository::new();
        repo.expect_insert_network_quality().returning(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (repo, inserted)
    }

    #[tokio::test]
    async fn probe_all_probes_every_configured_target() {
        let (repo, inserted) = counting_repo();
        let targets = vec![
            ProbeTarget { host: "127.0.0.1".to_string(), name: "loopback".to_string() },
            ProbeTarget { host: "127.0.0.2".to_string(), name: "loopback2".to_string() },
        ];
        let prober = NetworkQualityProber::new(Arc::new(repo), ProbeConfig { echo_count: 1, per_echo_timeout: Duration::from_millis(200) }, targets, Duration::from_secs(60));
        prober.probe_all().await;
        assert_eq!(inserted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_aborts_the_loop() {
        let repo = MockSignalRepository::new();
        let prober = Arc::new(NetworkQualityProber::new(Arc::new(repo), ProbeConfig::default(), vec![], Duration::from_secs(60)));
        prober.start().await;
        assert!(prober.is_running());
        prober.start().await;
        assert!(prober.is_running());
        prober.stop().await;
        assert!(!prober.is_running());
    }
}
