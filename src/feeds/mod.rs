//! The feeds module defines where the CVEs come from.
//!
//! A feed downloads recent CVE records from one source (e.g. NVD, OSV) and
//! turns them into [`CveCandidate`]s. Whatever happens, a feed answers with a
//! list: a feed that is down looks exactly like a feed with nothing new.

pub mod nvd;
pub mod osv;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::models::CveCandidate;

/// A common interface between all the feeds.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// The name of the feed, used in logs and reports.
    fn name(&self) -> &str;

    /// Fetches at most `limit` CVEs published during the last `window`,
    /// most recent first.
    /// Errors are logged by the feed and produce an empty list.
    async fn fetch(&self, limit: usize, window: Duration) -> Vec<CveCandidate>;
}

/// Parses a timestamp as found in the feeds.
///
/// RFC 3339 is accepted, as well as the NVD format which has no timezone
/// (e.g. 2018-01-18T23:29:00.213) and is read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// The oldest publication date accepted for a window ending now.
pub(crate) fn window_start(window: Duration) -> DateTime<Utc> {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Sorts the candidates by publication date, most recent first, and keeps
/// only the first `limit` ones. The sort is stable.
pub(crate) fn most_recent_first(
    mut candidates: Vec<CveCandidate>,
    limit: usize,
) -> Vec<CveCandidate> {
    candidates.sort_by(|a, b| b.published.cmp(&a.published));
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_parsed() {
        let nvd = parse_timestamp("2018-01-18T23:29:00.213").unwrap();
        assert_eq!(nvd.to_rfc3339(), "2018-01-18T23:29:00.213+00:00");

        let no_fraction = parse_timestamp("2024-05-02T10:00:00").unwrap();
        assert_eq!(no_fraction.to_rfc3339(), "2024-05-02T10:00:00+00:00");

        let rfc = parse_timestamp("2024-05-02T12:00:00+02:00").unwrap();
        assert_eq!(rfc, no_fraction);

        let zulu = parse_timestamp("2024-05-02T10:00:00Z").unwrap();
        assert_eq!(zulu, no_fraction);

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn most_recent_first_sorts_and_truncates() {
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap();
        let candidates = vec![
            CveCandidate::new("CVE-2024-0001", day(1), "a", "nvd"),
            CveCandidate::new("CVE-2024-0003", day(3), "c", "nvd"),
            CveCandidate::new("CVE-2024-0002", day(2), "b", "nvd"),
        ];
        let sorted = most_recent_first(candidates, 2);
        let ids: Vec<&str> = sorted.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2024-0003", "CVE-2024-0002"]);
    }

    #[test]
    fn huge_windows_do_not_overflow() {
        let start = window_start(Duration::from_secs(u64::MAX));
        assert!(start < Utc::now());
    }
}
