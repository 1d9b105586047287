//! Write the [`CveReport`]s as Markdown
//! One file per CVE, meant to be read by a human.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, trace};

use super::{report_file_name, write_file, Writer};
use crate::models::{CveReport, EngineOutcome};

/// How many hosts are listed per engine.
const MAX_HOSTS_LISTED: usize = 10;

/// A writer to store the reports as Markdown files.
pub struct MarkdownWriter {
    /// The directory where the files are written
    output_dir: PathBuf,
}

impl MarkdownWriter {
    /// Create a new MarkdownWriter
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Renders a report, generated at the given time.
    pub fn render(report: &CveReport, generated: DateTime<Utc>) -> String {
        trace!("Running MarkdownWriter::render()");
        let mut md = format!("# CVE Report: {}\n", report.cve_id);
        md.push_str(&format!(
            "- Generated: `{}`\n",
            generated.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push_str(&format!(
            "- Published: `{}` (source: {})\n\n",
            report.published.format("%Y-%m-%d %H:%M:%S UTC"),
            report.source
        ));
        md.push_str(&format!("## Description\n{}\n\n", report.description));
        md.push_str(&format!("## Summary\n{}\n\n", report.summary));

        if let Some(writeup) = &report.writeup {
            md.push_str("## Related Writeup\n");
            md.push_str(&format!("- **Title**: {}\n", writeup.title));
            md.push_str(&format!("- **Tags**: {}\n", writeup.tags.join(", ")));
            md.push_str(&format!("- **URL**: {}\n", writeup.url));
            md.push_str(&format!("- **Insight**: {}\n\n", writeup.insight));
        }

        md.push_str("## Live Targets\n");
        md.push_str(&format!("Query: `{}`\n\n", report.query));
        if report.targets.is_empty() {
            md.push_str("No search engine is known.\n");
        }
        for (engine, outcome) in report.targets.iter() {
            md.push_str(&format!("### {}\n", engine));
            match outcome {
                EngineOutcome::Hosts(hosts) if hosts.is_empty() => {
                    md.push_str("- no host found\n");
                }
                EngineOutcome::Hosts(hosts) => {
                    for host in hosts.iter().take(MAX_HOSTS_LISTED) {
                        md.push_str(&format!("- {}\n", host));
                    }
                    if hosts.len() > MAX_HOSTS_LISTED {
                        md.push_str(&format!(
                            "- ... and {} more\n",
                            hosts.len() - MAX_HOSTS_LISTED
                        ));
                    }
                }
                EngineOutcome::Failed(e) => md.push_str(&format!("- error: {}\n", e)),
                EngineOutcome::Unconfigured => md.push_str("- not configured\n"),
            }
        }

        if let Some(scan_findings) = &report.scan_findings {
            md.push_str("\n## Active Scans\n");
            for (scanner, finding) in scan_findings {
                md.push_str(&format!("### {}\n", scanner));
                if let Some(e) = finding.error() {
                    md.push_str(&format!("- error: {}\n", e));
                }
                let mut found = false;
                for (host, payload) in finding.hosts() {
                    found = true;
                    md.push_str(&format!("- **{}**\n```json\n{:#}\n```\n", host, payload));
                }
                if !found && finding.error().is_none() {
                    md.push_str("- nothing found\n");
                }
            }
        }
        md
    }
}

impl Writer for MarkdownWriter {
    /// Writes the report in `<output_dir>/<CVE id>.md`
    fn write(&self, report: &CveReport) -> io::Result<Option<PathBuf>> {
        let content = Self::render(report, Utc::now());
        let path = write_file(
            &self.output_dir,
            &report_file_name(&report.cve_id, "md"),
            &content,
        )?;
        info!("Markdown report written to {}", path.display());
        Ok(Some(path))
    }
}
