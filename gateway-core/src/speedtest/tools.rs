//! Speedtest tool adapters (spec.md §4.5 "Supported tools (capability
//! set)").
//!
//! Three external CLIs and three CDN-download probes. Every adapter is
//! probed at construction with a short version/help invocation; detection
//! failure yields silent unavailability rather than a startup error.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tokio::process::Command;

/// Canonical result shape every tool adapter returns (spec.md §4.5 "Tool
/// invocation contract").
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub status: Status,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub server_name: Option<String>,
    pub server_location: Option<String>,
    pub server_host: Option<String>,
    pub server_id: Option<String>,
    pub client_ip: Option<String>,
    pub isp: Option<String>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Timeout,
    Error,
}

impl ToolOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            download_mbps: 0.0,
            upload_mbps: 0.0,
            ping_ms: 0.0,
            server_name: None,
            server_location: None,
            server_host: None,
            server_id: None,
            client_ip: None,
            isp: None,
            result_url: None,
            error_message: Some(message.into()),
        }
    }

    fn timeout() -> Self {
        Self { status: Status::Timeout, ..Self::error("subprocess deadline exceeded") }
    }
}

#[async_trait]
pub trait SpeedtestTool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn detect(&self) -> bool;
    async fn run(&self, server_override: Option<&str>, timeout: Duration) -> ToolOutcome;
}

/// A CLI tool invoked as a subprocess, with output parsed via textual
/// patterns (spec.md §9 "External process management").
pub struct CliTool {
    binary: &'static str,
    probe_args: &'static [&'static str],
    run_args: &'static [&'static str],
    server_flag: Option<&'static str>,
}

impl CliTool {
    pub const fn new(binary: &'static str, probe_args: &'static [&'static str], run_args: &'static [&'static str], server_flag: Option<&'static str>) -> Self {
        Self { binary, probe_args, run_args, server_flag }
    }
}

fn download_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)download[:\s]+([0-9.]+)\s*mbps").unwrap())
}

fn upload_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)upload[:\s]+([0-9.]+)\s*mbps").unwrap())
}

fn ping_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)ping[:\s]+([0-9.]+)\s*ms").unwrap())
}

fn server_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)server[:\s]+(.+)").unwrap())
}

fn parse_cli_output(text: &str) -> Option<(f64, f64, f64, Option<String>)> {
    let download: f64 = download_regex().captures(text)?[1].parse().ok()?;
    let upload = upload_regex().captures(text).and_then(|c| c[1].parse().ok()).unwrap_or(0.0);
    let ping = ping_regex().captures(text).and_then(|c| c[1].parse().ok()).unwrap_or(0.0);
    let server = server_regex().captures(text).map(|c| c[1].trim().to_string());
    Some((download, upload, ping, server))
}

#[async_trait]
impl SpeedtestTool for CliTool {
    fn name(&self) -> &'static str {
        self.binary
    }

    async fn detect(&self) -> bool {
        let spawn = Command::new(self.binary).args(self.probe_args).stdout(Stdio::null()).stderr(Stdio::null()).status();
        matches!(tokio::time::timeout(Duration::from_secs(10), spawn).await, Ok(Ok(status)) if status.success())
    }

    async fn run(&self, server_override: Option<&str>, timeout: Duration) -> ToolOutcome {
        let mut command = Command::new(self.binary);
        command.args(self.run_args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let (Some(flag), Some(server)) = (self.server_flag, server_override) {
            command.arg(flag).arg(server);
        }

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutcome::error(format!("failed to spawn {}: {e}", self.binary)),
            Err(_) => return ToolOutcome::timeout(),
        };

        if !output.status.success() && output.stdout.is_empty() {
            return ToolOutcome::error(format!("{} exited with {}", self.binary, output.status));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        match parse_cli_output(&text) {
            Some((download_mbps, upload_mbps, ping_ms, server_name)) => ToolOutcome {
                status: Status::Success,
                download_mbps,
                upload_mbps,
                ping_ms,
                server_name,
                server_location: None,
                server_host: None,
                server_id: server_override.map(String::from),
                client_ip: None,
                isp: None,
                result_url: None,
                error_message: None,
            },
            None => ToolOutcome::error(format!("could not parse {} output", self.binary)),
        }
    }
}

/// A CDN download-only probe: measures wall-clock transfer time for a fixed
/// asset and derives Mbps. Upload is always zero.
pub struct CdnProbeTool {
    label: &'static str,
    url: &'static str,
    client: reqwest::Client,
}

impl CdnProbeTool {
    pub fn new(label: &'static str, url: &'static str) -> Self {
        Self { label, url, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl SpeedtestTool for CdnProbeTool {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn detect(&self) -> bool {
        tokio::time::timeout(Duration::from_secs(10), self.client.head(self.url).send())
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    async fn run(&self, _server_override: Option<&str>, timeout: Duration) -> ToolOutcome {
        let started = Instant::now();
        let response = match tokio::time::timeout(timeout, self.client.get(self.url).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return ToolOutcome::error(format!("{}: request failed: {e}", self.label)),
            Err(_) => return ToolOutcome::timeout(),
        };

        let bytes = match tokio::time::timeout(timeout, response.bytes()).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return ToolOutcome::error(format!("{}: body read failed: {e}", self.label)),
            Err(_) => return ToolOutcome::timeout(),
        };

        let elapsed = started.elapsed().as_secs_f64().max(0.001);
        let download_mbps = (bytes.len() as f64 * 8.0) / elapsed / 1_000_000.0;

        ToolOutcome {
            status: Status::Success,
            download_mbps,
            upload_mbps: 0.0,
            ping_ms: elapsed * 1000.0,
            server_name: Some(self.label.to_string()),
            server_location: None,
            server_host: Some(self.url.to_string()),
            server_id: None,
            client_ip: None,
            isp: None,
            result_url: Some(self.url.to_string()),
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_cli_output_lines() {
        let text = "Server: Example ISP - City\nPing: 12.4 ms\nDownload: 250.5 Mbps\nUpload: 20.1 Mbps\n";
        let (download, upload, ping, server) = parse_cli_output(text).unwrap();
        assert_eq!(download, 250.5);
        assert_eq!(upload, 20.1);
        assert_eq!(ping, 12.4);
        assert_eq!(server.as_deref(), Some("Example ISP - City"));
    }

    #[test]
    fn missing_download_line_fails_to_parse() {
        assert!(parse_cli_output("Ping: 10 ms\n").is_none());
    }
}
