//! The configuration of a run.
//!
//! [`Config`] is built once from the command line and the environment (see
//! [`Args`](crate::application::Args)), then validated. Optional credentials
//! are kept as one `Option` per engine: an engine without credentials is
//! simply never created.

use std::path::PathBuf;
use std::time::Duration;

use log::trace;

use crate::error::ConfigError;
use crate::models::{Scanners, Writers};

/// Shodan API credentials.
#[derive(Clone, Debug, PartialEq)]
pub struct ShodanCredentials {
    pub api_key: String,
}

/// Censys Search API credentials.
#[derive(Clone, Debug, PartialEq)]
pub struct CensysCredentials {
    pub api_id: String,
    pub api_secret: String,
}

/// FOFA API credentials.
#[derive(Clone, Debug, PartialEq)]
pub struct FofaCredentials {
    pub email: String,
    pub key: String,
}

/// The credentials of every known search engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineCredentials {
    pub shodan: Option<ShodanCredentials>,
    pub censys: Option<CensysCredentials>,
    pub fofa: Option<FofaCredentials>,
}

impl EngineCredentials {
    /// Builds the credentials from raw optional values, as read from the
    /// environment. A pair is kept only when both halves are set.
    pub fn from_values(
        shodan_key: Option<String>,
        censys_id: Option<String>,
        censys_secret: Option<String>,
        fofa_email: Option<String>,
        fofa_key: Option<String>,
    ) -> Self {
        trace!("Running EngineCredentials::from_values()");
        Self {
            shodan: non_empty(shodan_key).map(|api_key| ShodanCredentials { api_key }),
            censys: pair(censys_id, censys_secret).map(|(api_id, api_secret)| {
                CensysCredentials { api_id, api_secret }
            }),
            fofa: pair(fofa_email, fofa_key).map(|(email, key)| FofaCredentials { email, key }),
        }
    }
}

/// The settings of the summarizer.
#[derive(Clone, Debug, PartialEq)]
pub struct SummarizerConfig {
    /// None if the key is not set, which is a fatal error.
    pub api_key: Option<String>,
    /// The model to use.
    pub model: String,
    /// The OpenAI compatible chat completion endpoint.
    pub endpoint: String,
}

/// The settings of the active scan stage.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanConfig {
    /// The scanners to run.
    pub scanners: Vec<Scanners>,
    /// How many tool processes may run at the same time.
    pub workers: usize,
    /// The wall clock limit of one tool process.
    pub timeout: Duration,
    /// The nuclei binary.
    pub nuclei_path: String,
    /// The nmap binary.
    pub nmap_path: String,
}

/// Everything a run needs to know.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// How many CVEs to process.
    pub limit: usize,
    /// Only CVEs published during this window are fetched.
    pub window: Duration,
    /// The feed to use first. None means all the feeds are merged.
    pub preferred_source: Option<String>,
    /// The NVD bulk feed. None disables the feed.
    pub nvd_feed_url: Option<String>,
    /// The OSV batch query endpoint. None disables the feed.
    pub osv_feed_url: Option<String>,
    /// Where the reports are written.
    pub output_dir: PathBuf,
    /// The writers to use.
    pub writers: Vec<Writers>,
    /// How many CVEs are processed at the same time.
    pub cve_workers: usize,
    /// The timeout of every HTTP call.
    pub http_timeout: Duration,
    /// The maximum number of hosts asked to each engine.
    pub max_hosts: usize,
    /// The search engines credentials.
    pub credentials: EngineCredentials,
    /// None if the summaries are disabled.
    pub summarizer: Option<SummarizerConfig>,
    /// None if no active scan must be performed.
    pub scan: Option<ScanConfig>,
    /// A JSON file replacing the built-in query rules.
    pub query_rules: Option<PathBuf>,
    /// A JSON file of writeups.
    pub writeups: Option<PathBuf>,
}

impl Config {
    /// Checks that the configuration allows a run.
    /// The output directory and the files are checked later, when used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        trace!("Running Config::validate()");
        if self.limit == 0 {
            return Err(ConfigError::Zero("--limit"));
        }
        if self.cve_workers == 0 {
            return Err(ConfigError::Zero("--cve-workers"));
        }
        if self.max_hosts == 0 {
            return Err(ConfigError::Zero("--max-hosts"));
        }
        if self.nvd_feed_url.is_none() && self.osv_feed_url.is_none() {
            return Err(ConfigError::NoFeeds);
        }
        if let Some(summarizer) = &self.summarizer {
            if summarizer.api_key.is_none() {
                return Err(ConfigError::MissingSummarizerKey);
            }
        }
        if let Some(scan) = &self.scan {
            if scan.scanners.is_empty() {
                return Err(ConfigError::NoScanners);
            }
            if scan.workers == 0 {
                return Err(ConfigError::Zero("--scan-workers"));
            }
        }
        Ok(())
    }
}

/// Treats empty strings as absent values.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Both values, or nothing.
fn pair(a: Option<String>, b: Option<String>) -> Option<(String, String)> {
    Some((non_empty(a)?, non_empty(b)?))
}
