//! Gateway wire client (spec.md §4.8, §6 "Gateway wire format (consumed)").
//!
//! `GET /TMI/v1/gateway?get=all` returns a JSON document whose numeric
//! fields may arrive as either JSON numbers or JSON strings. Rather than a
//! post-hoc string check, decoding goes through a handful of small lenient
//! accessors over the raw `serde_json::Value` — the idiomatic way to
//! express "this field is numeric but the producer isn't consistent about
//! it" without hand-rolling a custom `Deserialize` impl per field.

use std::time::Duration;
use uuid::Uuid;

use crate::error::{GatewayError, TransportError};
use crate::types::SignalSample;

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a static config");

        Self {
            http,
            base_url: format!("http://{host}:{port}"),
        }
    }

    /// Fetch and decode one `SignalSample`. Returns the decoded sample and
    /// the raw JSON payload (`CurrentRaw()` in spec.md §4.1).
    pub async fn fetch(&self) -> Result<(SignalSample, serde_json::Value), GatewayError> {
        let url = format!("{}/TMI/v1/gateway?get=all", self.base_url);

        let response = self.http.get(&url).send().await.map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            return Err(GatewayError::Transport(TransportError::Http(format!(
                "status {}",
                response.status()
            ))));
        }

        let raw: serde_json::Value = response.json().await.map_err(classify_reqwest_error)?;
        let sample = parse_gateway_payload(&raw)?;
        Ok((sample, raw))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Transport(TransportError::Timeout)
    } else if err.is_connect() {
        GatewayError::Transport(TransportError::ConnectionRefused)
    } else if err.is_decode() {
        GatewayError::Parse(err.to_string())
    } else {
        GatewayError::Transport(TransportError::Http(err.to_string()))
    }
}

/// Decode the gateway's `signal`/`device` JSON document into a
/// `SignalSample`, tolerating numeric fields sent as strings.
pub fn parse_gateway_payload(raw: &serde_json::Value) -> Result<SignalSample, GatewayError> {
    let signal = raw
        .get("signal")
        .ok_or_else(|| GatewayError::Parse("missing `signal` object".to_string()))?;

    let nr = signal.get("5g");
    let lte = signal.get("4g");
    let device = raw.get("device");

    Ok(SignalSample {
        id: Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        timestamp_unix: crate::types::unix_seconds(chrono::Utc::now()),

        nr_sinr: lenient_f64(nr, "sinr"),
        nr_rsrp: lenient_f64(nr, "rsrp"),
        nr_rsrq: lenient_f64(nr, "rsrq"),
        nr_rssi: lenient_f64(nr, "rssi"),
        nr_bands: lenient_str_vec(nr, "bands"),
        nr_gnb_id: lenient_i64(nr, "gNBID"),
        nr_cid: lenient_i64(nr, "cid"),

        lte_sinr: lenient_f64(lte, "sinr"),
        lte_rsrp: lenient_f64(lte, "rsrp"),
        lte_rsrq: lenient_f64(lte, "rsrq"),
        lte_rssi: lenient_f64(lte, "rssi"),
        lte_bands: lenient_str_vec(lte, "bands"),
        lte_enb_id: lenient_i64(lte, "eNBID"),
        lte_cid: lenient_i64(lte, "cid"),

        registration_status: device.and_then(|d| d.get("connectionStatus")).and_then(|v| v.as_str()).map(String::from),
        device_uptime: device.and_then(|d| lenient_i64(Some(d), "deviceUptime")),
    })
}

fn lenient_f64(obj: Option<&serde_json::Value>, key: &str) -> Option<f64> {
    let value = obj?.get(key)?;
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    value.as_str()?.trim().parse::<f64>().ok()
}

fn lenient_i64(obj: Option<&serde_json::Value>, key: &str) -> Option<i64> {
    let value = obj?.get(key)?;
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value.as_str()?.trim().parse::<i64>().ok()
}

fn lenient_str_vec(obj: Option<&serde_json::Value>, key: &str) -> Option<Vec<String>> {
    let value = obj?.get(key)?.as_array()?;
    Some(value.iter().filter_map(|v| v.as_str().map(String::from)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numeric_fields_sent_as_strings() {
        let raw = json!({
            "signal": {
                "5g": { "sinr": "12.5", "rsrp": -95, "bands": ["n71", "n41"], "gNBID": "1234" },
                "4g": { "sinr": 8.0, "eNBID": 77 }
            },
            "device": { "connectionStatus": "CONNECTED", "deviceUptime": "3600" }
        });

        let sample = parse_gateway_payload(&raw).unwrap();
        assert_eq!(sample.nr_sinr, Some(12.5));
        assert_eq!(sample.nr_rsrp, Some(-95.0));
        assert_eq!(sample.nr_bands, Some(vec!["n71".to_string(), "n41".to_string()]));
        assert_eq!(sample.nr_gnb_id, Some(1234));
        assert_eq!(sample.lte_sinr, Some(8.0));
        assert_eq!(sample.lte_enb_id, Some(77));
        assert_eq!(sample.registration_status, Some("CONNECTED".to_string()));
        assert_eq!(sample.device_uptime, Some(3600));
    }

    #[test]
    fn missing_signal_object_is_a_parse_error() {
        let raw = json!({ "device": {} });
        assert!(parse_gateway_payload(&raw).is_err());
    }

    #[test]
    fn all_null_metrics_still_parses_as_no_signal_sample() {
        let raw = json!({ "signal": { "5g": {}, "4g": {} } });
        let sample = parse_gateway_payload(&raw).unwrap();
        assert!(!sample.has_nr_signal());
        assert!(!sample.has_lte_signal());
    }
}
