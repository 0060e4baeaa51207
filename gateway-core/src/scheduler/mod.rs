//! Scheduler (spec.md §4.6) — drives the Speedtest Orchestrator on an
//! interval, gated by an optional time-of-day window and weekend flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::SchedulerError;
use crate::speedtest::{RunOptions, SpeedtestOrchestrator};
use crate::storage::SignalRepository;
use crate::types::{SpeedtestStatus, TriggeredBy};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: f64,
    pub time_window_start_hour: Option<u32>,
    pub time_window_end_hour: Option<u32>,
    pub run_on_weekends: bool,
    pub tools_to_run: Vec<String>,
    pub delay_between_tools_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 60.0,
            time_window_start_hour: None,
            time_window_end_hour: None,
            run_on_weekends: true,
            tools_to_run: Vec::new(),
            delay_between_tools_seconds: 10,
        }
    }
}

/// Whether `now` falls inside the configured run window (spec.md §4.6
/// "Window predicate").
fn in_window(config: &SchedulerConfig, now: DateTime<Utc>) -> bool {
    if !config.run_on_weekends && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    match (config.time_window_start_hour, config.time_window_end_hour) {
        (Some(start), Some(end)) => {
            let hour = now.hour();
            if start <= end {
                hour >= start && hour < end
            } else {
                hour >= start || hour < end
            }
        }
        _ => true,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub last_test_at: Option<DateTime<Utc>>,
    pub next_test_at: Option<DateTime<Utc>>,
    pub next_in_seconds: Option<f64>,
    pub average_download_mbps: Option<f64>,
    pub average_upload_mbps: Option<f64>,
    pub running: bool,
}

#[derive(Default)]
struct StatsInner {
    completed_runs: u64,
    failed_runs: u64,
    last_test_at: Option<DateTime<Utc>>,
    next_test_at: Option<DateTime<Utc>>,
    download_sum_mbps: f64,
    upload_sum_mbps: f64,
}

impl StatsInner {
    fn record(&mut self, result: &crate::types::SpeedtestResult) {
        self.last_test_at = Some(result.timestamp);
        if result.status == SpeedtestStatus::Success {
            self.completed_runs += 1;
            self.download_sum_mbps += result.download_mbps;
            self.upload_sum_mbps += result.upload_mbps;
        } else {
            self.failed_runs += 1;
        }
    }

    fn snapshot(&self, running: bool) -> SchedulerStats {
        let next_in_seconds = self.next_test_at.map(|at| (at - Utc::now()).num_milliseconds() as f64 / 1000.0);
        SchedulerStats {
            completed_runs: self.completed_runs,
            failed_runs: self.failed_runs,
            last_test_at: self.last_test_at,
            next_test_at: self.next_test_at,
            next_in_seconds,
            average_download_mbps: (self.completed_runs > 0).then(|| self.download_sum_mbps / self.completed_runs as f64),
            average_upload_mbps: (self.completed_runs > 0).then(|| self.upload_sum_mbps / self.completed_runs as f64),
            running,
        }
    }
}

/// Drives a [`SpeedtestOrchestrator`] on an interval. Accumulated counters
/// survive a mid-run `update_config` call; only the internal ticker restarts.
pub struct Scheduler<R: SignalRepository + 'static> {
    orchestrator: Arc<SpeedtestOrchestrator<R>>,
    config: Mutex<SchedulerConfig>,
    stats: Arc<Mutex<StatsInner>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: SignalRepository + 'static> Scheduler<R> {
    pub fn new(orchestrator: Arc<SpeedtestOrchestrator<R>>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            config: Mutex::new(config),
            stats: Arc::new(Mutex::new(StatsInner::default())),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.spawn_loop().await;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(SchedulerError::NotRunning);
        }
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        self.stats.lock().await.next_test_at = None;
        Ok(())
    }

    /// Replace the configuration. If the scheduler is running, the internal
    /// ticker restarts on the new interval without resetting accumulated
    /// counters (spec.md §4.6 "Start/Stop").
    pub async fn update_config(&self, config: SchedulerConfig) {
        *self.config.lock().await = config;
        if self.is_running() {
            if let Some(handle) = self.task.lock().await.take() {
                handle.abort();
            }
            self.spawn_loop().await;
        }
    }

    async fn spawn_loop(&self) {
        let snapshot = self.config.lock().await.clone();
        let period = Duration::from_secs_f64((snapshot.interval_minutes * 60.0).max(1.0));

        let orchestrator = self.orchestrator.clone();
        let config = Mutex::new(snapshot);
        let stats = self.stats.clone();

        let handle = tokio::spawn(run_loop(orchestrator, config, stats, period));
        *self.task.lock().await = Some(handle);
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.stats.lock().await.snapshot(self.is_running())
    }

    /// Run one cycle immediately, outside the interval loop (e.g. for tests
    /// or a manual "run now" API call).
    pub async fn run_cycle_now(&self) {
        let config = self.config.lock().await.clone();
        run_cycle(&self.orchestrator, &config, &self.stats).await;
    }
}

async fn run_loop<R: SignalRepository + 'static>(
    orchestrator: Arc<SpeedtestOrchestrator<R>>,
    config: Mutex<SchedulerConfig>,
    stats: Arc<Mutex<StatsInner>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        {
            let next_at = Utc::now() + chrono::Duration::from_std(period).unwrap_or_default();
            stats.lock().await.next_test_at = Some(next_at);
        }
        ticker.tick().await;
        let config = config.lock().await.clone();
        run_cycle(&orchestrator, &config, &stats).await;
    }
}

async fn run_cycle<R: SignalRepository + 'static>(
    orchestrator: &Arc<SpeedtestOrchestrator<R>>,
    config: &SchedulerConfig,
    stats: &Arc<Mutex<StatsInner>>,
) {
    if !in_window(config, Utc::now()) {
        return;
    }

    if config.tools_to_run.is_empty() {
        let mut opts = RunOptions::default();
        opts.triggered_by = TriggeredBy::Scheduler;
        match orchestrator.run(opts).await {
            Ok(result) => stats.lock().await.record(&result),
            Err(e) => {
                warn!(error = %e, "scheduled speedtest failed");
                stats.lock().await.failed_runs += 1;
            }
        }
        return;
    }

    let last_index = config.tools_to_run.len() - 1;
    for (i, tool_name) in config.tools_to_run.iter().enumerate() {
        let mut opts = RunOptions::default();
        opts.triggered_by = TriggeredBy::Scheduler;
        opts.tool_name = Some(tool_name.clone());
        match orchestrator.run(opts).await {
            Ok(result) => stats.lock().await.record(&result),
            Err(e) => {
                warn!(error = %e, tool = %tool_name, "scheduled speedtest failed");
                stats.lock().await.failed_runs += 1;
            }
        }
        if i != last_index {
            tokio::time::sleep(Duration::from_secs(config.delay_between_tools_seconds)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::{ContextConfig, SpeedtestTool, ToolOutcome, ToolStatus};
    use crate::storage::*;
    use crate::types::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn counting_repo() -> (MockSignalRepository, Arc<StdMutex<Vec<SpeedtestResult>>>) {
        let inserted: Arc<StdMutex<Vec<SpeedtestResult>>> = Arc::new(StdMutex::new(Vec::new()));
        let recorded = inserted.clone();
        let mut repo = MockSignalRepository::new();
        repo.expect_insert_speedtest().returning(move |rec| {
            recorded.lock().unwrap().push(rec.clone());
            Ok(())
        });
        (repo, inserted)
    }

    struct StubTool;

    #[async_trait]
    impl SpeedtestTool for StubTool {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn detect(&self) -> bool {
            true
        }
        async fn run(&self, _: Option<&str>, _: Duration) -> ToolOutcome {
            ToolOutcome {
                status: ToolStatus::Success,
                download_mbps: 50.0,
                upload_mbps: 10.0,
                ping_ms: 5.0,
                server_name: None,
                server_location: None,
                server_host: None,
                server_id: None,
                client_ip: None,
                isp: None,
                result_url: None,
                error_message: None,
            }
        }
    }

    async fn scheduler_with_stub_tool(config: SchedulerConfig) -> (Scheduler<MockSignalRepository>, Arc<StdMutex<Vec<SpeedtestResult>>>) {
        let (repo, inserted) = counting_repo();
        let tools: Vec<Arc<dyn SpeedtestTool>> = vec![Arc::new(StubTool)];
        let orchestrator = Arc::new(SpeedtestOrchestrator::new(Arc::new(repo), tools, ContextConfig::default(), Duration::from_secs(5)).await);
        (Scheduler::new(orchestrator, config), inserted)
    }

    #[test]
    fn normal_range_window_excludes_hours_outside_start_end() {
        let config = SchedulerConfig { time_window_start_hour: Some(8), time_window_end_hour: Some(18), ..SchedulerConfig::default() };
        let in_hours = Utc::now().with_hour(10).unwrap();
        let out_hours = Utc::now().with_hour(20).unwrap();
        assert!(in_window(&config, in_hours));
        assert!(!in_window(&config, out_hours));
    }

    #[test]
    fn wrap_around_window_treats_late_night_as_in_window() {
        let config = SchedulerConfig { time_window_start_hour: Some(22), time_window_end_hour: Some(6), ..SchedulerConfig::default() };
        let late_night = Utc::now().with_hour(23).unwrap();
        let mid_morning = Utc::now().with_hour(8).unwrap();
        assert!(in_window(&config, late_night));
        assert!(!in_window(&config, mid_morning));
    }

    #[test]
    fn weekend_excluded_when_run_on_weekends_is_false() {
        let config = SchedulerConfig { run_on_weekends: false, ..SchedulerConfig::default() };
        let saturday = DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(saturday.weekday(), Weekday::Sat);
        assert!(!in_window(&config, saturday));
    }

    #[tokio::test]
    async fn start_when_already_running_is_rejected() {
        let (scheduler, _repo) = scheduler_with_stub_tool(SchedulerConfig::default()).await;
        scheduler.start().await.unwrap();
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_when_not_running_is_rejected() {
        let (scheduler, _repo) = scheduler_with_stub_tool(SchedulerConfig::default()).await;
        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test]
    async fn run_cycle_now_with_empty_tools_list_records_one_successful_run() {
        let (scheduler, inserted) = scheduler_with_stub_tool(SchedulerConfig::default()).await;
        scheduler.run_cycle_now().await;
        assert_eq!(inserted.lock().unwrap().len(), 1);
        let stats = scheduler.stats().await;
        assert_eq!(stats.completed_runs, 1);
        assert_eq!(stats.average_download_mbps, Some(50.0));
    }

    #[tokio::test]
    async fn run_cycle_now_with_explicit_tools_runs_each_once() {
        let config = SchedulerConfig { tools_to_run: vec!["stub".to_string(), "stub".to_string()], delay_between_tools_seconds: 0, ..SchedulerConfig::default() };
        let (scheduler, inserted) = scheduler_with_stub_tool(config).await;
        scheduler.run_cycle_now().await;
        assert_eq!(inserted.lock().unwrap().len(), 2);
    }
}
