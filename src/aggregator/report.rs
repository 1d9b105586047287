//! Assembly of the final [`CveReport`].

use std::collections::BTreeMap;

use crate::models::{CveCandidate, CveReport, ScanFinding, SearchQuery, TargetSet, Writeup};

/// Merges everything known about a CVE into its report.
///
/// Every input is already resolved, failures included, so this never fails
/// and never waits. Calling it twice with the same inputs gives the same
/// report.
pub fn build_report(
    candidate: &CveCandidate,
    summary: &str,
    query: &SearchQuery,
    targets: &TargetSet,
    scan_findings: Option<&BTreeMap<String, ScanFinding>>,
    writeup: Option<&Writeup>,
) -> CveReport {
    CveReport {
        cve_id: candidate.id.clone(),
        description: candidate.description.clone(),
        published: candidate.published,
        source: candidate.source.clone(),
        summary: summary.to_string(),
        query: query.clone(),
        targets: targets.clone(),
        scan_findings: scan_findings.cloned(),
        writeup: writeup.cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineOutcome;
    use chrono::{TimeZone, Utc};

    fn inputs() -> (CveCandidate, TargetSet, BTreeMap<String, ScanFinding>) {
        let candidate = CveCandidate::new(
            "CVE-2025-29927",
            Utc.with_ymd_and_hms(2025, 3, 21, 15, 15, 0).unwrap(),
            "Authorization bypass in Next.js middleware",
            "nvd",
        );
        let mut targets = TargetSet::new();
        targets.insert("shodan", EngineOutcome::Unconfigured);
        targets.insert("censys", EngineOutcome::Failed("401".to_string()));
        let mut findings = BTreeMap::new();
        findings.insert(
            "nuclei".to_string(),
            ScanFinding::from_error("nuclei failed: exit status: 1"),
        );
        (candidate, targets, findings)
    }

    #[test]
    fn report_keeps_every_input() {
        let (candidate, targets, findings) = inputs();
        let query = SearchQuery::new("next.js");
        let report = build_report(
            &candidate,
            "summary",
            &query,
            &targets,
            Some(&findings),
            None,
        );

        assert_eq!(report.cve_id, "CVE-2025-29927");
        assert_eq!(report.description, candidate.description);
        assert_eq!(report.summary, "summary");
        assert_eq!(report.query, query);
        assert_eq!(report.targets, targets);
        assert_eq!(
            report.scan_findings.unwrap()["nuclei"].error(),
            Some("nuclei failed: exit status: 1")
        );
        assert!(report.writeup.is_none());
    }

    #[test]
    fn assembly_is_idempotent() {
        let (candidate, targets, findings) = inputs();
        let writeup = Writeup {
            title: "Next.js Middleware Hack".to_string(),
            tags: vec!["next.js".to_string()],
            url: "https://example.com/nextjs".to_string(),
            insight: "Header injection".to_string(),
        };
        let query = SearchQuery::new("next.js");
        let first = build_report(&candidate, "s", &query, &targets, Some(&findings), Some(&writeup));
        let second = build_report(&candidate, "s", &query, &targets, Some(&findings), Some(&writeup));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
