//! Speedtest Orchestrator (spec.md §4.5) — runs at most one external speed
//! test at a time, chooses a tool, labels network context, and persists the
//! outcome regardless of status.

mod context;
mod tools;

pub use context::ContextConfig;
pub use tools::{CdnProbeTool, CliTool, SpeedtestTool, Status as ToolStatus, ToolOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::SpeedtestError;
use crate::storage::SignalRepository;
use crate::types::{NetworkContext, SpeedtestResult, SpeedtestStatus, TriggeredBy};

pub struct RunOptions {
    pub tool_name: Option<String>,
    pub server_override: Option<String>,
    pub triggered_by: TriggeredBy,
    pub signal_snapshot: Option<serde_json::Value>,
    pub skip_context_probe: bool,
    pub context_override: Option<NetworkContext>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tool_name: None,
            server_override: None,
            triggered_by: TriggeredBy::Manual,
            signal_snapshot: None,
            skip_context_probe: false,
            context_override: None,
        }
    }
}

/// Executes speed tests one at a time, across a preference-ordered set of
/// tool adapters, persisting every invocation including `busy` outcomes.
pub struct SpeedtestOrchestrator<R: SignalRepository> {
    repo: Arc<R>,
    tools: Vec<Arc<dyn SpeedtestTool>>,
    available: Vec<bool>,
    context_config: ContextConfig,
    tool_timeout: Duration,
    running: AtomicBool,
}

impl<R: SignalRepository> SpeedtestOrchestrator<R> {
    /// Tool preference order is fixed at construction; availability is
    /// probed once up front (spec.md §4.5 "Tool detection").
    pub async fn new(repo: Arc<R>, tools: Vec<Arc<dyn SpeedtestTool>>, context_config: ContextConfig, tool_timeout: Duration) -> Self {
        let mut available = Vec::with_capacity(tools.len());
        for tool in &tools {
            available.push(tool.detect().await);
        }

        Self { repo, tools, available, context_config, tool_timeout, running: AtomicBool::new(false) }
    }

    /// The tools discovered as available at construction, in preference order.
    pub fn discovered(&self) -> Vec<&'static str> {
        self.tools
            .iter()
            .zip(self.available.iter())
            .filter(|(_, available)| **available)
            .map(|(tool, _)| tool.name())
            .collect()
    }

    fn select(&self, requested: Option<&str>) -> Option<&Arc<dyn SpeedtestTool>> {
        if let Some(name) = requested {
            return self
                .tools
                .iter()
                .zip(self.available.iter())
                .find(|(tool, available)| **available && tool.name() == name)
                .map(|(tool, _)| tool);
        }
        self.tools.iter().zip(self.available.iter()).find(|(_, available)| **available).map(|(tool, _)| tool)
    }

    pub async fn run(&self, opts: RunOptions) -> Result<SpeedtestResult, SpeedtestError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return self.persist_busy(&opts).await;
        }

        let result = self.run_locked(opts).await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_locked(&self, opts: RunOptions) -> Result<SpeedtestResult, SpeedtestError> {
        let Some(tool) = self.select(opts.tool_name.as_deref()) else {
            return self.persist_no_tool(&opts).await;
        };
        let tool = tool.clone();

        let (network_context, pre_test_latency_ms) = match opts.context_override {
            Some(context) => (context, None),
            None if opts.skip_context_probe => (NetworkContext::Unknown, None),
            None => context::label_context(&self.context_config).await,
        };

        let outcome = tool.run(opts.server_override.as_deref(), self.tool_timeout).await;
        let now = chrono::Utc::now();

        let status = match outcome.status {
            ToolStatus::Success => SpeedtestStatus::Success,
            ToolStatus::Timeout => SpeedtestStatus::Timeout,
            ToolStatus::Error => SpeedtestStatus::Error,
        };

        let record = SpeedtestResult {
            id: Uuid::new_v4(),
            timestamp: now,
            timestamp_unix: crate::types::unix_seconds(now),
            download_mbps: outcome.download_mbps,
            upload_mbps: outcome.upload_mbps,
            ping_ms: outcome.ping_ms,
            jitter_ms: None,
            packet_loss_percent: None,
            server_name: outcome.server_name,
            server_location: outcome.server_location,
            server_host: outcome.server_host,
            server_id: outcome.server_id,
            client_ip: outcome.client_ip,
            isp: outcome.isp,
            tool: tool.name().to_string(),
            result_url: outcome.result_url,
            signal_snapshot: opts.signal_snapshot,
            status,
            error_message: outcome.error_message,
            triggered_by: opts.triggered_by,
            network_context,
            pre_test_latency_ms,
        };

        self.repo.insert_speedtest(&record).await.map_err(SpeedtestError::Storage)?;
        Ok(record)
    }

    async fn persist_busy(&self, opts: &RunOptions) -> Result<SpeedtestResult, SpeedtestError> {
        self.persist_synthetic(opts, SpeedtestStatus::Busy, "orchestrator is already running a test").await
    }

    async fn persist_no_tool(&self, opts: &RunOptions) -> Result<SpeedtestResult, SpeedtestError> {
        self.persist_synthetic(opts, SpeedtestStatus::Error, "no speedtest tool is available").await
    }

    async fn persist_synthetic(&self, opts: &RunOptions, status: SpeedtestStatus, message: &str) -> Result<SpeedtestResult, SpeedtestError> {
        let now = chrono::Utc::now();
        let record = SpeedtestResult {
            id: Uuid::new_v4(),
            timestamp: now,
            timestamp_unix: crate::types::unix_seconds(now),
            download_mbps: 0.0,
            upload_mbps: 0.0,
            ping_ms: 0.0,
            jitter_ms: None,
            packet_loss_percent: None,
            server_name: None,
            server_location: None,
            server_host: None,
            server_id: None,
            client_ip: None,
            isp: None,
            tool: opts.tool_name.clone().unwrap_or_else(|| "none".to_string()),
            result_url: None,
            signal_snapshot: opts.signal_snapshot.clone(),
            status,
            error_message: Some(message.to_string()),
            triggered_by: opts.triggered_by,
            network_context: NetworkContext::Unknown,
            pre_test_latency_ms: None,
        };

        self.repo.insert_speedtest(&record).await.map_err(SpeedtestError::Storage)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
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

    struct StubTool {
        name: &'static str,
        available: bool,
        outcome: ToolOutcome,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeedtestTool for StubTool {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn detect(&self) -> bool {
            self.available
        }
        async fn run(&self, _: Option<&str>, _: Duration) -> ToolOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn success_outcome() -> ToolOutcome {
        ToolOutcome {
            status: ToolStatus::Success,
            download_mbps: 100.0,
            upload_mbps: 20.0,
            ping_ms: 8.0,
            server_name: Some("test".to_string()),
            server_location: None,
            server_host: None,
            server_id: None,
            client_ip: None,
            isp: None,
            result_url: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn selects_first_available_tool_in_preference_order() {
        let (repo, _inserted) = counting_repo();
        let repo = Arc::new(repo);
        let tools: Vec<Arc<dyn SpeedtestTool>> = vec![
            Arc::new(StubTool { name: "unavailable", available: false, outcome: success_outcome(), calls: AtomicUsize::new(0) }),
            Arc::new(StubTool { name: "preferred", available: true, outcome: success_outcome(), calls: AtomicUsize::new(0) }),
        ];
        let orchestrator = SpeedtestOrchestrator::new(repo.clone(), tools, ContextConfig::default(), Duration::from_secs(5)).await;

        let mut opts = RunOptions::default();
        opts.context_override = Some(NetworkContext::Unknown);
        let result = orchestrator.run(opts).await.unwrap();
        assert_eq!(result.tool, "preferred");
        assert_eq!(result.status, SpeedtestStatus::Success);
    }

    #[tokio::test]
    async fn second_concurrent_run_is_busy_without_invoking_the_tool() {
        let (repo, _inserted) = counting_repo();
        let repo = Arc::new(repo);
        let tool = Arc::new(StubTool { name: "slow", available: true, outcome: success_outcome(), calls: AtomicUsize::new(0) });
        let tools: Vec<Arc<dyn SpeedtestTool>> = vec![tool.clone()];
        let orchestrator = Arc::new(SpeedtestOrchestrator::new(repo.clone(), tools, ContextConfig::default(), Duration::from_secs(5)).await);

        orchestrator.running.store(true, Ordering::SeqCst);
        let mut opts = RunOptions::default();
        opts.context_override = Some(NetworkContext::Unknown);
        let result = orchestrator.run(opts).await.unwrap();
        assert_eq!(result.status, SpeedtestStatus::Busy);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_available_tool_persists_error_result() {
        let (repo, inserted) = counting_repo();
        let tools: Vec<Arc<dyn SpeedtestTool>> =
            vec![Arc::new(StubTool { name: "down", available: false, outcome: success_outcome(), calls: AtomicUsize::new(0) })];
        let orchestrator = SpeedtestOrchestrator::new(Arc::new(repo), tools, ContextConfig::default(), Duration::from_secs(5)).await;

        let mut opts = RunOptions::default();
        opts.context_override = Some(NetworkContext::Unknown);
        let result = orchestrator.run(opts).await.unwrap();
        assert_eq!(result.status, SpeedtestStatus::Error);
        assert_eq!(inserted.lock().unwrap().len(), 1);
    }
}
