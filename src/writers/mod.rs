//! Writing Reports
//!
//! Once a [`CveReport`] is complete, it's up to the writers to handle it. It
//! provides a common interface, allowing to write the reports without
//! affecting the execution of the pipeline.

pub mod json;
pub mod markdown;
pub mod textstdout;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::trace;

use crate::models::{CveReport, Writers};

use self::json::JsonWriter;
use self::markdown::MarkdownWriter;
use self::textstdout::TextStdoutWriter;

/// A trait to have a common interface between writers.
/// A writer has the responsibility to write the [`CveReport`]s in a way,
/// be it on standard output or in files.
pub trait Writer: Send + Sync {
    /// Write one report.
    /// Returns the path of the file written, if any.
    fn write(&self, report: &CveReport) -> io::Result<Option<PathBuf>>;
}

/// Creates the writers selected by the user.
pub fn from_kinds(kinds: &[Writers], output_dir: &Path) -> Vec<Box<dyn Writer>> {
    trace!("Running writers::from_kinds()");
    let mut writers: Vec<Box<dyn Writer>> = Vec::new();
    for kind in kinds {
        match kind {
            Writers::Markdown => writers.push(Box::new(MarkdownWriter::new(output_dir))),
            Writers::Json => writers.push(Box::new(JsonWriter::new(output_dir))),
            Writers::TextStdout => writers.push(Box::new(TextStdoutWriter::new())),
        }
    }
    writers
}

/// The name of the file of a report: the CVE id, with the characters that
/// would create directories replaced.
pub fn report_file_name(cve_id: &str, extension: &str) -> String {
    format!("{}.{}", cve_id.replace(['/', '\\'], "_"), extension)
}

/// Writes the content in the output directory, creating it if needed.
pub(crate) fn write_file(
    output_dir: &Path,
    file_name: &str,
    content: &str,
) -> io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(file_name);
    fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{EngineOutcome, ScanFinding, SearchQuery, TargetSet, Writeup};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;

    /// A report with a bit of everything.
    pub(crate) fn sample_report() -> CveReport {
        let mut targets = TargetSet::new();
        targets.insert("shodan", EngineOutcome::Unconfigured);
        targets.insert(
            "censys",
            EngineOutcome::Hosts(vec!["203.0.113.5".to_string()]),
        );
        targets.insert("fofa", EngineOutcome::Failed("quota exceeded".to_string()));
        let mut nuclei = ScanFinding::new();
        nuclei.insert("203.0.113.5", json!([{"template-id": "cve-2025-29927"}]));
        let mut findings = BTreeMap::new();
        findings.insert("nuclei".to_string(), nuclei);

        CveReport {
            cve_id: "CVE-2025-29927".to_string(),
            description: "Authorization bypass in Next.js middleware".to_string(),
            published: Utc.with_ymd_and_hms(2025, 3, 21, 15, 15, 0).unwrap(),
            source: "nvd".to_string(),
            summary: "Middleware header spoofing allows unauthorized access.".to_string(),
            query: SearchQuery::new("Authorization bypass in Next.js middleware"),
            targets,
            scan_findings: Some(findings),
            writeup: Some(Writeup {
                title: "Next.js Middleware Hack".to_string(),
                tags: vec!["next.js".to_string(), "x-middleware".to_string()],
                url: "https://example.com/nextjs-hack".to_string(),
                insight: "x-middleware-subrequest header injection.".to_string(),
            }),
        }
    }

    #[test]
    fn file_names_are_path_safe() {
        assert_eq!(
            report_file_name("CVE-2025-29927", "md"),
            "CVE-2025-29927.md"
        );
        assert_eq!(
            report_file_name("GHSA/abc/../x", "json"),
            "GHSA_abc_.._x.json"
        );
    }

    #[test]
    fn from_kinds_creates_writers() {
        let writers = from_kinds(
            &[Writers::Markdown, Writers::Json, Writers::TextStdout],
            Path::new("reports"),
        );
        assert_eq!(writers.len(), 3);
    }
}
