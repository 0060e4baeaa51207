use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of radio conditions at one poll instant (spec.md §3).
///
/// Invariant: at least one of the NR or LTE groups has at least one non-null
/// metric, or the sample represents "no signal" (all metrics null, written
/// anyway to preserve temporal continuity in the history table).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalSample {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub timestamp_unix: f64,

    pub nr_sinr: Option<f64>,
    pub nr_rsrp: Option<f64>,
    pub nr_rsrq: Option<f64>,
    pub nr_rssi: Option<f64>,
    pub nr_bands: Option<Vec<String>>,
    pub nr_gnb_id: Option<i64>,
    pub nr_cid: Option<i64>,

    pub lte_sinr: Option<f64>,
    pub lte_rsrp: Option<f64>,
    pub lte_rsrq: Option<f64>,
    pub lte_rssi: Option<f64>,
    pub lte_bands: Option<Vec<String>>,
    pub lte_enb_id: Option<i64>,
    pub lte_cid: Option<i64>,

    pub registration_status: Option<String>,
    pub device_uptime: Option<i64>,
}

impl SignalSample {
    /// Whether the 5G-NR radio reports any signal at all.
    pub fn has_nr_signal(&self) -> bool {
        self.nr_sinr.is_some() || self.nr_rsrp.is_some() || self.nr_rsrq.is_some() || self.nr_rssi.is_some()
    }

    /// Whether the LTE radio reports any signal at all.
    pub fn has_lte_signal(&self) -> bool {
        self.lte_sinr.is_some() || self.lte_rsrp.is_some() || self.lte_rsrq.is_some() || self.lte_rssi.is_some()
    }

    /// Connection-mode inference from spec.md §4.3: derived solely from
    /// which radios have any signal.
    pub fn connection_mode(&self) -> ConnectionMode {
        match (self.has_nr_signal(), self.has_lte_signal()) {
            (true, true) => ConnectionMode::Nsa,
            (true, false) => ConnectionMode::Sa,
            (false, true) => ConnectionMode::Lte,
            (false, false) => ConnectionMode::NoSignal,
        }
    }
}

/// Coarse connection-mode classification derived from radio signal presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    Sa,
    Nsa,
    Lte,
    NoSignal,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Sa => "SA",
            ConnectionMode::Nsa => "NSA",
            ConnectionMode::Lte => "LTE",
            ConnectionMode::NoSignal => "No Signal",
        }
    }
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_sample() -> SignalSample {
        SignalSample {
            id: uuid::Uuid::nil(),
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
        }
    }

    #[test]
    fn connection_mode_sa_only_nr() {
        let mut s = blank_sample();
        s.nr_sinr = Some(12.0);
        assert_eq!(s.connection_mode(), ConnectionMode::Sa);
    }

    #[test]
    fn connection_mode_nsa_when_both_present() {
        let mut s = blank_sample();
        s.nr_sinr = Some(12.0);
        s.lte_sinr = Some(8.0);
        assert_eq!(s.connection_mode(), ConnectionMode::Nsa);
    }

    #[test]
    fn connection_mode_lte_only() {
        let mut s = blank_sample();
        s.lte_rsrp = Some(-95.0);
        assert_eq!(s.connection_mode(), ConnectionMode::Lte);
    }

    #[test]
    fn connection_mode_no_signal() {
        let s = blank_sample();
        assert_eq!(s.connection_mode(), ConnectionMode::NoSignal);
    }
}
