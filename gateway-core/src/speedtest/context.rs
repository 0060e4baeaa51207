//! Network-context labelling (spec.md §4.5 "Network-context labelling").

use chrono::{Timelike, Utc};

use crate::quality::{ping, ProbeConfig};
use crate::types::NetworkContext;

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub idle_hours: Vec<u32>,
    pub baseline_latency_ms: f64,
    pub light_latency_multiplier: f64,
    pub busy_latency_multiplier: f64,
    pub probe_target: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            idle_hours: vec![0, 1, 2, 3, 4, 5],
            baseline_latency_ms: 20.0,
            light_latency_multiplier: 1.5,
            busy_latency_multiplier: 3.0,
            probe_target: "1.1.1.1".to_string(),
        }
    }
}

/// Classify ambient network load before a speedtest runs. Returns the label
/// plus the measured pre-test latency, if any was taken.
pub async fn label_context(config: &ContextConfig) -> (NetworkContext, Option<f64>) {
    let current_hour = Utc::now().hour();
    if config.idle_hours.contains(&current_hour) {
        return (NetworkContext::Baseline, None);
    }

    let stats = ping(&config.probe_target, ProbeConfig { echo_count: 3, per_echo_timeout: std::time::Duration::from_secs(5) }).await;
    let Some(latency) = stats.latency_ms() else {
        return (NetworkContext::Unknown, None);
    };

    let ratio = latency / config.baseline_latency_ms;
    let context = if ratio < config.light_latency_multiplier {
        NetworkContext::Idle
    } else if ratio < config.busy_latency_multiplier {
        NetworkContext::Light
    } else {
        NetworkContext::Busy
    };

    (context, Some(latency))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_below_light_multiplier_is_idle() {
        let config = ContextConfig::default();
        let ratio = 10.0 / config.baseline_latency_ms;
        assert!(ratio < config.light_latency_multiplier);
    }

    #[test]
    fn idle_hours_default_covers_midnight_through_5am() {
        let config = ContextConfig::default();
        assert!(config.idle_hours.contains(&2));
        assert!(!config.idle_hours.contains(&14));
    }
}
