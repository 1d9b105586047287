//! The nuclei scanner.
//! nuclei prints one JSON object per match when run with `-jsonl`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde_json::Value;

use super::{ActiveScanAdapter, ToolRunner};
use crate::error::AdapterError;
use crate::models::ScanFinding;

/// The name of the scanner.
pub const NAME: &str = "nuclei";

/// Runs nuclei against each host, with the CVE templates when a
/// vulnerability is given.
pub struct NucleiScanner {
    runner: ToolRunner,
}

impl NucleiScanner {
    /// Creates a new NucleiScanner.
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }

    /// The arguments for one host.
    pub fn arguments(host: &str, vulnerability_ref: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "-u".to_string(),
            host.to_string(),
            "-jsonl".to_string(),
            "-silent".to_string(),
            "-disable-update-check".to_string(),
        ];
        if let Some(reference) = vulnerability_ref {
            // Templates are identified by the CVE id in lowercase
            args.push("-id".to_string());
            args.push(reference.to_lowercase());
        }
        args
    }

    /// Scans one host.
    async fn scan_host(
        &self,
        host: &str,
        vulnerability_ref: Option<&str>,
    ) -> Result<Vec<(String, Value)>, AdapterError> {
        let stdout = self
            .runner
            .run(&Self::arguments(host, vulnerability_ref))
            .await?;
        Ok(parse_jsonl(&stdout, host).into_iter().collect())
    }
}

#[async_trait]
impl ActiveScanAdapter for NucleiScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn scan(&self, hosts: &[String], vulnerability_ref: Option<&str>) -> ScanFinding {
        trace!("Running NucleiScanner::scan()");
        debug!(
            "nuclei will scan {} hosts for {:?}",
            hosts.len(),
            vulnerability_ref
        );
        self.runner
            .for_each_host(hosts, |host| self.scan_host(host, vulnerability_ref))
            .await
    }
}

/// Parses the output of nuclei, one JSON object per line.
///
/// The matches are grouped by their `host` field (the scanned host when it's
/// missing) into arrays. Lines which are not JSON objects are skipped.
pub fn parse_jsonl(output: &str, scanned_host: &str) -> BTreeMap<String, Value> {
    trace!("Running nuclei::parse_jsonl()");
    let mut matches: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for (index, line) in output.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) => {
                warn!("Skipping nuclei output line {}: not an object", index + 1);
                continue;
            }
            Err(e) => {
                warn!("Skipping nuclei output line {}: {}", index + 1, e);
                continue;
            }
        };
        let host = value
            .get("host")
            .and_then(|h| h.as_str())
            .unwrap_or(scanned_host)
            .to_string();
        matches.entry(host).or_default().push(value);
    }

    matches
        .into_iter()
        .map(|(host, values)| (host, Value::Array(values)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_jsonl_skips_corrupt_lines() {
        let output = concat!(
            r#"{"template-id":"cve-2024-0001","host":"http://192.0.2.1","severity":"high"}"#,
            "\n",
            r#"{"template-id":"cve-2024-0001","host":"#,
            "\n",
            "[nuclei] progress 50%\n",
            "\n",
            r#"{"template-id":"cve-2024-0001","matched-at":"192.0.2.1:443"}"#,
            "\n",
            r#"{"template-id":"tech-detect","host":"http://192.0.2.1","severity":"info"}"#,
            "\n",
            "42\n",
        );
        let matches = parse_jsonl(output, "192.0.2.1");
        assert_eq!(matches.len(), 2);
        assert_eq!(
            matches["http://192.0.2.1"],
            json!([
                {"template-id":"cve-2024-0001","host":"http://192.0.2.1","severity":"high"},
                {"template-id":"tech-detect","host":"http://192.0.2.1","severity":"info"}
            ])
        );
        assert_eq!(
            matches["192.0.2.1"],
            json!([{"template-id":"cve-2024-0001","matched-at":"192.0.2.1:443"}])
        );
    }

    #[test]
    fn parse_jsonl_on_empty_output() {
        assert!(parse_jsonl("", "192.0.2.1").is_empty());
    }

    #[test]
    fn arguments_use_the_cve_template() {
        assert_eq!(
            NucleiScanner::arguments("192.0.2.1", Some("CVE-2025-29927")),
            vec![
                "-u",
                "192.0.2.1",
                "-jsonl",
                "-silent",
                "-disable-update-check",
                "-id",
                "cve-2025-29927"
            ]
        );
        assert_eq!(NucleiScanner::arguments("192.0.2.1", None).len(), 5);
    }
}
