//! Errors of the application.
//!
//! Two families exist. [`AdapterError`] is what a feed, an engine, a scanner
//! or the summarizer can run into while talking to the outside world. It
//! never leaves the pipeline: the [`Aggregator`](crate::aggregator::Aggregator)
//! turns it into a placeholder in the report. [`ConfigError`] is detected at
//! startup and stops the run before any CVE is processed.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// An error met by an adapter while calling an external source.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The HTTP request could not be sent or the body not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with an unexpected status code.
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The remote answered with a payload we can't understand.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The call didn't finish in time.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// An external tool exited with a failure.
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    /// Local I/O failed (spawning a process, reading a file...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was cancelled before the call started.
    #[error("cancelled before the call started")]
    Cancelled,
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        AdapterError::Malformed(e.to_string())
    }
}

/// A configuration problem, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("summaries are enabled but GROQ_API_KEY is not set (use --no-summary to skip them)")]
    MissingSummarizerKey,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no feed URL is configured")]
    NoFeeds,

    #[error("scanning is enabled but no scanner is selected")]
    NoScanners,

    #[error("unable to create the output directory {path}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to build the HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_error_messages() {
        let err = AdapterError::Status {
            status: 401,
            body: "invalid key".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected HTTP status 401: invalid key");

        let err = AdapterError::Timeout(Duration::from_secs(20));
        assert_eq!(err.to_string(), "timed out after 20s");

        let err = AdapterError::Tool {
            tool: "nuclei".to_string(),
            message: "exit status 2".to_string(),
        };
        assert_eq!(err.to_string(), "nuclei failed: exit status 2");
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::Zero("--cve-workers").to_string(),
            "--cve-workers must be greater than zero"
        );
        let err = ConfigError::OutputDir {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "unable to create the output directory /nope");
    }
}
