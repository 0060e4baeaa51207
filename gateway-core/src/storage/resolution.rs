//! Resolution policy for `QuerySignalHistory` (spec.md §4.2).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::SignalSample;

/// The resolved strategy for a single `QuerySignalHistory` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Return all rows in range, ascending, unmodified.
    Full,
    /// Downsample into buckets of this many seconds.
    Bucket(u64),
}

/// Given `duration_minutes` and a `resolution` hint, decide the bucket
/// strategy (spec.md §4.2 "Resolution policy for `QuerySignalHistory`").
pub fn resolve_bucket_seconds(duration_minutes: f64, resolution: &str) -> Resolution {
    if resolution == "full" || duration_minutes <= 5.0 {
        return Resolution::Full;
    }

    if resolution == "auto" {
        let seconds = if duration_minutes <= 60.0 {
            5
        } else if duration_minutes <= 360.0 {
            30
        } else if duration_minutes <= 1440.0 {
            60
        } else {
            300
        };
        return Resolution::Bucket(seconds);
    }

    match resolution.parse::<u64>() {
        Ok(seconds) if seconds > 0 => Resolution::Bucket(seconds),
        _ => resolve_bucket_seconds(duration_minutes, "auto"),
    }
}

/// Bucket ascending-ordered `rows` by `floor(timestamp_unix / bucket_seconds)`.
///
/// Per-bucket numeric metrics take the arithmetic mean of non-null values;
/// categorical fields (bands, registration status) and tower ids take the
/// lexicographic/numeric maximum (a proxy for "last stable" value);
/// `id`/`timestamp` take the earliest in-bucket values; `timestamp_unix` is
/// the bucket's left edge.
pub fn bucket_samples(rows: &[SignalSample], bucket_seconds: u64) -> Vec<SignalSample> {
    if bucket_seconds == 0 {
        return rows.to_vec();
    }

    let mut buckets: BTreeMap<i64, Vec<&SignalSample>> = BTreeMap::new();
    for row in rows {
        let bucket = (row.timestamp_unix / bucket_seconds as f64).floor() as i64;
        buckets.entry(bucket).or_default().push(row);
    }

    buckets
        .into_iter()
        .map(|(bucket, members)| aggregate_bucket(bucket, bucket_seconds, &members))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn max_opt_i64(values: impl Iterator<Item = i64>) -> Option<i64> {
    values.max()
}

fn max_opt_string(values: impl Iterator<Item = String>) -> Option<String> {
    values.max()
}

fn aggregate_bucket(bucket: i64, bucket_seconds: u64, members: &[&SignalSample]) -> SignalSample {
    let first = members.first().expect("bucket always has at least one member");

    let bucket_unix = (bucket * bucket_seconds as i64) as f64;

    SignalSample {
        id: first.id,
        timestamp: left_edge(bucket_unix),
        timestamp_unix: bucket_unix,

        nr_sinr: mean(members.iter().filter_map(|s| s.nr_sinr)),
        nr_rsrp: mean(members.iter().filter_map(|s| s.nr_rsrp)),
        nr_rsrq: mean(members.iter().filter_map(|s| s.nr_rsrq)),
        nr_rssi: mean(members.iter().filter_map(|s| s.nr_rssi)),
        nr_bands: max_opt_string(members.iter().filter_map(|s| s.nr_bands.clone().map(|b| b.join(",")))).map(|s| {
            s.split(',').map(|p| p.to_string()).collect()
        }),
        nr_gnb_id: max_opt_i64(members.iter().filter_map(|s| s.nr_gnb_id)),
        nr_cid: max_opt_i64(members.iter().filter_map(|s| s.nr_cid)),

        lte_sinr: mean(members.iter().filter_map(|s| s.lte_sinr)),
        lte_rsrp: mean(members.iter().filter_map(|s| s.lte_rsrp)),
        lte_rsrq: mean(members.iter().filter_map(|s| s.lte_rsrq)),
        lte_rssi: mean(members.iter().filter_map(|s| s.lte_rssi)),
        lte_bands: max_opt_string(members.iter().filter_map(|s| s.lte_bands.clone().map(|b| b.join(",")))).map(|s| {
            s.split(',').map(|p| p.to_string()).collect()
        }),
        lte_enb_id: max_opt_i64(members.iter().filter_map(|s| s.lte_enb_id)),
        lte_cid: max_opt_i64(members.iter().filter_map(|s| s.lte_cid)),

        registration_status: max_opt_string(members.iter().filter_map(|s| s.registration_status.clone())),
        device_uptime: max_opt_i64(members.iter().filter_map(|s| s.device_uptime)),
    }
}

fn left_edge(bucket_unix: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(bucket_unix as i64, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample(ts_unix: f64, nr_sinr: Option<f64>) -> SignalSample {
        SignalSample {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            timestamp_unix: ts_unix,
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
    fn full_resolution_bypasses_downsampling_at_five_minutes() {
        assert_eq!(resolve_bucket_seconds(5.0, "auto"), Resolution::Full);
        assert_eq!(resolve_bucket_seconds(5.0, "60"), Resolution::Full);
    }

    #[test]
    fn auto_picks_bucket_by_range() {
        assert_eq!(resolve_bucket_seconds(30.0, "auto"), Resolution::Bucket(5));
        assert_eq!(resolve_bucket_seconds(120.0, "auto"), Resolution::Bucket(30));
        assert_eq!(resolve_bucket_seconds(720.0, "auto"), Resolution::Bucket(60));
        assert_eq!(resolve_bucket_seconds(2000.0, "auto"), Resolution::Bucket(300));
    }

    #[test]
    fn numeric_string_is_used_directly() {
        assert_eq!(resolve_bucket_seconds(120.0, "45"), Resolution::Bucket(45));
    }

    #[test]
    fn downsample_math_averages_nr_sinr_in_one_bucket() {
        let rows = vec![sample(0.0, Some(10.0)), sample(10.0, Some(20.0)), sample(20.0, Some(30.0))];
        let bucketed = bucket_samples(&rows, 60);
        assert_eq!(bucketed.len(), 1);
        assert_eq!(bucketed[0].nr_sinr, Some(20.0));
        assert_eq!(bucketed[0].timestamp_unix, 0.0);
    }
}
