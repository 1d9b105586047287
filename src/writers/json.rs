//! Write the [`CveReport`]s as JSON
//! One file per CVE, meant to be read by other tools.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use serde_json::value::Value;

use super::{report_file_name, write_file, Writer};
use crate::models::CveReport;

/// A writer to store the reports as JSON files.
pub struct JsonWriter {
    /// The directory where the files are written
    output_dir: PathBuf,
}

impl JsonWriter {
    /// Create a new JsonWriter
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Converts a report to JSON, with its generation time.
    pub fn to_value(report: &CveReport, generated: DateTime<Utc>) -> io::Result<Value> {
        let mut value = serde_json::to_value(report)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "generated".to_string(),
                Value::String(generated.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        Ok(value)
    }
}

impl Writer for JsonWriter {
    /// Writes the report in `<output_dir>/<CVE id>.json`
    fn write(&self, report: &CveReport) -> io::Result<Option<PathBuf>> {
        let value = Self::to_value(report, Utc::now())?;
        let content = serde_json::to_string_pretty(&value)?;
        let path = write_file(
            &self.output_dir,
            &report_file_name(&report.cve_id, "json"),
            &content,
        )?;
        info!("JSON report written to {}", path.display());
        Ok(Some(path))
    }
}
