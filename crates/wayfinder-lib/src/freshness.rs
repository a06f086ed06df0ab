//! Staleness classification and download size estimates.

use chrono::{DateTime, Utc};
use serde::Serialize;

const IMAGE_SHARE_PERCENT: u64 = 70;
const BYTES_PER_IMAGE: u64 = 800 * 1024;
const BYTES_PER_NODE: u64 = 1024;
/// Free space must exceed the estimate by this percentage.
const HEADROOM_PERCENT: u128 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Staleness {
    pub severity: Severity,
    pub message: String,
    /// Whole hours since the last sync; `None` when never synced.
    pub hours: Option<i64>,
}

/// Classify how stale the offline data is.
pub fn classify(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Staleness {
    let Some(last_sync) = last_sync else {
        return Staleness {
            severity: Severity::High,
            message: "Never synced. Download campus data to use it offline.".to_string(),
            hours: None,
        };
    };

    // Clock skew can put the last sync in the future.
    let hours = (now - last_sync).num_hours().max(0);
    let days = hours / 24;
    let (severity, message) = match hours {
        0 => (Severity::None, "Synced less than an hour ago".to_string()),
        1..=23 => (Severity::None, format!("Synced {hours} hours ago")),
        24..=71 => (Severity::Low, format!("Synced {days} days ago")),
        72..=167 => (
            Severity::Medium,
            format!("Synced {days} days ago. Consider refreshing."),
        ),
        _ => (
            Severity::High,
            format!("Synced {days} days ago. Data may be out of date."),
        ),
    };

    Staleness {
        severity,
        message,
        hours: Some(hours),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadEstimate {
    pub images: u64,
    pub image_bytes: u64,
    pub metadata_bytes: u64,
    pub total_bytes: u64,
}

/// Expected size of a full download for `node_count` nodes.
pub fn estimate_download_size(node_count: usize) -> DownloadEstimate {
    let nodes = node_count as u64;
    let images = (nodes * IMAGE_SHARE_PERCENT).div_ceil(100);
    let image_bytes = images * BYTES_PER_IMAGE;
    let metadata_bytes = nodes * BYTES_PER_NODE;
    DownloadEstimate {
        images,
        image_bytes,
        metadata_bytes,
        total_bytes: image_bytes + metadata_bytes,
    }
}

pub fn has_storage_headroom(available_bytes: u64, estimated_bytes: u64) -> bool {
    u128::from(available_bytes) * 100 > u128::from(estimated_bytes) * HEADROOM_PERCENT
}

/// Human readable byte size, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn just_synced_is_fresh() {
        let staleness = classify(Some(now()), now());
        assert_eq!(staleness.severity, Severity::None);
        assert_eq!(staleness.hours, Some(0));
    }

    #[test]
    fn thresholds() {
        let at = |hours: i64| classify(Some(now() - Duration::hours(hours)), now()).severity;
        assert_eq!(at(23), Severity::None);
        assert_eq!(at(24), Severity::Low);
        assert_eq!(at(71), Severity::Low);
        assert_eq!(at(4 * 24), Severity::Medium);
        assert_eq!(at(7 * 24), Severity::High);
        assert_eq!(at(10 * 24), Severity::High);
    }

    #[test]
    fn never_synced_is_high_with_its_own_message() {
        let never = classify(None, now());
        let old = classify(Some(now() - Duration::days(10)), now());
        assert_eq!(never.severity, Severity::High);
        assert_eq!(never.hours, None);
        assert_ne!(never.message, old.message);
        assert!(never.message.contains("Never synced"));
    }

    #[test]
    fn future_sync_is_clamped() {
        let staleness = classify(Some(now() + Duration::hours(5)), now());
        assert_eq!(staleness.severity, Severity::None);
        assert_eq!(staleness.hours, Some(0));
    }

    #[test]
    fn estimate_rounds_image_share_up() {
        let estimate = estimate_download_size(10);
        assert_eq!(estimate.images, 7);
        assert_eq!(estimate.total_bytes, 7 * 800 * 1024 + 10 * 1024);

        assert_eq!(estimate_download_size(1).images, 1);
        assert_eq!(estimate_download_size(0).total_bytes, 0);
    }

    #[test]
    fn headroom_requires_twenty_percent_margin() {
        assert!(has_storage_headroom(121, 100));
        assert!(!has_storage_headroom(120, 100));
        assert!(!has_storage_headroom(50, 100));
        assert!(has_storage_headroom(1, 0));
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(800 * 1024 * 1024), "800.0 MB");
    }
}
