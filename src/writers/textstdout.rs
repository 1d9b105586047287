//! Write the [`CveReport`]s to standard output
//! It presents each report as one line of text, to follow a run in the
//! terminal.

use std::io;
use std::path::PathBuf;

use super::Writer;
use crate::models::{CveReport, EngineOutcome};

/// A writer to print the reports in the terminal.
pub struct TextStdoutWriter {}

impl TextStdoutWriter {
    /// Create a new TextStdoutWriter
    pub fn new() -> Self {
        Self {}
    }

    /// The line printed for a report.
    pub fn line(report: &CveReport) -> String {
        let engines: Vec<String> = report
            .targets
            .iter()
            .map(|(engine, outcome)| match outcome {
                EngineOutcome::Hosts(hosts) => format!("{}={}", engine, hosts.len()),
                EngineOutcome::Failed(_) => format!("{}=error", engine),
                EngineOutcome::Unconfigured => format!("{}=off", engine),
            })
            .collect();
        let scans = match &report.scan_findings {
            Some(findings) => findings
                .iter()
                .map(|(scanner, finding)| {
                    let status = if finding.error().is_some() { "error" } else { "ok" };
                    format!("{}={}/{}", scanner, finding.hosts().count(), status)
                })
                .collect::<Vec<String>>()
                .join(" "),
            None => "no scan".to_string(),
        };
        let description: String = report.description.chars().take(80).collect();
        format!(
            "[{}] {} | targets: {} | scans: {}",
            report.cve_id,
            description,
            engines.join(" "),
            scans
        )
    }
}

impl Default for TextStdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer for TextStdoutWriter {
    /// Prints the report on STDOUT
    fn write(&self, report: &CveReport) -> io::Result<Option<PathBuf>> {
        println!("{}", Self::line(report));
        Ok(None)
    }
}
