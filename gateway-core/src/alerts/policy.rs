//! Alert policy and threshold evaluation (spec.md §4.4 "Policy", "Evaluation
//! rules").

use crate::types::{AlertType, Severity, SignalSample, SpeedtestResult};

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub enabled: bool,
    pub sinr_critical: f64,
    pub sinr_warning: f64,
    pub rsrp_critical: f64,
    pub rsrp_warning: f64,
    pub speed_low_threshold_mbps: f64,
    pub packet_loss_threshold_percent: f64,
    pub jitter_threshold_ms: f64,
    pub notify_on_warning: bool,
    pub notify_on_critical: bool,
    pub cooldown_minutes: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            sinr_critical: -5.0,
            sinr_warning: 0.0,
            rsrp_critical: -110.0,
            rsrp_warning: -100.0,
            speed_low_threshold_mbps: 10.0,
            packet_loss_threshold_percent: 5.0,
            jitter_threshold_ms: 50.0,
            notify_on_warning: true,
            notify_on_critical: true,
            cooldown_minutes: 5.0,
        }
    }
}

/// One threshold breach prior to suppression.
#[derive(Debug, Clone)]
pub struct Finding {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// Evaluate the latest sample and speedtest against the policy (spec.md
/// §4.4 "Evaluation rules"). Suppression is applied by the caller.
pub fn evaluate(policy: &AlertPolicy, sample: Option<&SignalSample>, speedtest: Option<&SpeedtestResult>) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(sample) = sample {
        signal_finding(policy, "5G-NR SINR", "dB", sample.nr_sinr, policy.sinr_critical, policy.sinr_warning, &mut findings);
        signal_finding(policy, "5G-NR RSRP", "dBm", sample.nr_rsrp, policy.rsrp_critical, policy.rsrp_warning, &mut findings);
        signal_finding(policy, "4G LTE SINR", "dB", sample.lte_sinr, policy.sinr_critical, policy.sinr_warning, &mut findings);
        signal_finding(policy, "4G LTE RSRP", "dBm", sample.lte_rsrp, policy.rsrp_critical, policy.rsrp_warning, &mut findings);
    }

    if let Some(speedtest) = speedtest {
        if speedtest.download_mbps < policy.speed_low_threshold_mbps {
            findings.push(Finding {
                alert_type: AlertType::SpeedLow,
                severity: Severity::Warning,
                title: "Download speed low".to_string(),
                message: format!("download {:.1} Mbps below {:.1} Mbps threshold", speedtest.download_mbps, policy.speed_low_threshold_mbps),
                data: serde_json::json!({ "download_mbps": speedtest.download_mbps }),
            });
        }
        if let Some(loss) = speedtest.packet_loss_percent {
            if loss > policy.packet_loss_threshold_percent {
                findings.push(Finding {
                    alert_type: AlertType::PacketLoss,
                    severity: Severity::Warning,
                    title: "Packet loss elevated".to_string(),
                    message: format!("packet loss {loss:.1}% above {:.1}% threshold", policy.packet_loss_threshold_percent),
                    data: serde_json::json!({ "packet_loss_percent": loss }),
                });
            }
        }
        if let Some(jitter) = speedtest.jitter_ms {
            if jitter > policy.jitter_threshold_ms {
                findings.push(Finding {
                    alert_type: AlertType::HighJitter,
                    severity: Severity::Warning,
                    title: "Jitter elevated".to_string(),
                    message: format!("jitter {jitter:.1} ms above {:.1} ms threshold", policy.jitter_threshold_ms),
                    data: serde_json::json!({ "jitter_ms": jitter }),
                });
            }
        }
    }

    findings
}

fn signal_finding(
    _policy: &AlertPolicy,
    label: &str,
    unit: &str,
    value: Option<f64>,
    critical: f64,
    warning: f64,
    out: &mut Vec<Finding>,
) {
    let Some(value) = value else { return };

    if value < critical {
        out.push(Finding {
            alert_type: AlertType::SignalCritical,
            severity: Severity::Critical,
            title: format!("{label} critical"),
            message: format!("{label} at {value:.1} {unit}, below critical threshold {critical:.1}"),
            data: serde_json::json!({ "metric": label, "value": value }),
        });
    } else if value < warning {
        out.push(Finding {
            alert_type: AlertType::SignalDrop,
            severity: Severity::Warning,
            title: format!("{label} degraded"),
            message: format!("{label} at {value:.1} {unit}, below warning threshold {warning:.1}"),
            data: serde_json::json!({ "metric": label, "value": value }),
        });
    }
}

/// Suppression rules, applied in order (spec.md §4.4 "Suppression rules").
/// Any one true means drop.
pub fn is_suppressed(policy: &AlertPolicy, severity: Severity, last_fired_minutes_ago: Option<f64>) -> bool {
    if !policy.enabled {
        return true;
    }
    match severity {
        Severity::Warning if !policy.notify_on_warning => return true,
        Severity::Critical if !policy.notify_on_critical => return true,
        _ => {}
    }
    if let Some(minutes_ago) = last_fired_minutes_ago {
        if minutes_ago < policy.cooldown_minutes {
            return true;
        }
    }
    false
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

    #[test]
    fn sinr_below_critical_fires_signal_critical() {
        let policy = AlertPolicy::default();
        let findings = evaluate(&policy, Some(&sample(Some(-8.0))), None);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].alert_type, AlertType::SignalCritical);
    }

    #[test]
    fn sinr_between_thresholds_fires_signal_drop_warning() {
        let policy = AlertPolicy::default();
        let findings = evaluate(&policy, Some(&sample(Some(-2.0))), None);
        assert_eq!(findings[0].alert_type, AlertType::SignalDrop);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn warning_suppressed_when_notify_on_warning_is_false() {
        let mut policy = AlertPolicy::default();
        policy.notify_on_warning = false;
        assert!(is_suppressed(&policy, Severity::Warning, None));
    }

    #[test]
    fn cooldown_suppresses_within_window() {
        let policy = AlertPolicy::default();
        assert!(is_suppressed(&policy, Severity::Warning, Some(1.0)));
        assert!(!is_suppressed(&policy, Severity::Warning, Some(10.0)));
    }

    #[test]
    fn disabled_policy_suppresses_everything() {
        let mut policy = AlertPolicy::default();
        policy.enabled = false;
        assert!(is_suppressed(&policy, Severity::Critical, None));
    }
}
