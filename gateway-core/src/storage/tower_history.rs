//! Derived tower-handoff history (spec.md §4.2 "TowerHistory").
//!
//! Design note (spec.md §9): the source tags every change event as `4g`
//! whenever the 5G id happened not to change, even when the LTE id didn't
//! change either. This implementation only emits an event when the radio
//! it's tagged for actually changed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SignalSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TowerRadio {
    Nr5g,
    Lte4g,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerChange {
    pub radio: TowerRadio,
    pub from_id: i64,
    pub to_id: i64,
    pub timestamp: DateTime<Utc>,
    pub timestamp_unix: f64,
}

/// Scan ascending-ordered `rows` and emit one `TowerChange` whenever a
/// radio's tower id differs from the previous observation of that radio.
pub fn derive_tower_history(rows: &[SignalSample]) -> Vec<TowerChange> {
    let mut changes = Vec::new();
    let mut last_nr: Option<i64> = None;
    let mut last_lte: Option<i64> = None;

    for row in rows {
        if let (Some(prev), Some(curr)) = (last_nr, row.nr_gnb_id) {
            if prev != curr {
                changes.push(TowerChange {
                    radio: TowerRadio::Nr5g,
                    from_id: prev,
                    to_id: curr,
                    timestamp: row.timestamp,
                    timestamp_unix: row.timestamp_unix,
                });
            }
        }
        if let (Some(prev), Some(curr)) = (last_lte, row.lte_enb_id) {
            if prev != curr {
                changes.push(TowerChange {
                    radio: TowerRadio::Lte4g,
                    from_id: prev,
                    to_id: curr,
                    timestamp: row.timestamp,
                    timestamp_unix: row.timestamp_unix,
                });
            }
        }

        if row.nr_gnb_id.is_some() {
            last_nr = row.nr_gnb_id;
        }
        if row.lte_enb_id.is_some() {
            last_lte = row.lte_enb_id;
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(nr_gnb_id: Option<i64>) -> SignalSample {
        SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: 0.0,
            nr_sinr: None,
            nr_rsrp: None,
            nr_rsrq: None,
            nr_rssi: None,
            nr_bands: None,
            nr_gnb_id,
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
    fn tower_handoff_a_a_b_b_c_yields_two_changes() {
        let rows = vec![
            sample(Some(1)), // A
            sample(Some(1)), // A
            sample(Some(2)), // B
            sample(Some(2)), // B
            sample(Some(3)), // C
        ];
        let changes = derive_tower_history(&rows);
        assert_eq!(changes.len(), 2);
        assert_eq!((changes[0].from_id, changes[0].to_id), (1, 2));
        assert_eq!((changes[1].from_id, changes[1].to_id), (2, 3));
    }

    #[test]
    fn no_event_when_neither_id_changes() {
        let rows = vec![sample(Some(1)), sample(Some(1))];
        assert!(derive_tower_history(&rows).is_empty());
    }
}
