//! This module implements a feed querying the OSV batch API with a recency
//! window. OSV advisories carry their own identifiers (GHSA, PYSEC...), the
//! CVE alias is used instead when there is one, so the records reconcile
//! with the other feeds.
//! https://google.github.io/osv.dev/api/

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, trace, warn};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AdapterError, ConfigError};
use crate::feeds::{most_recent_first, parse_timestamp, window_start, FeedAdapter};
use crate::http;
use crate::models::CveCandidate;

/// The default OSV batch query endpoint.
pub const DEFAULT_OSV_FEED_URL: &str = "https://api.osv.dev/v1/querybatch";

/// A feed backed by the OSV query batch API.
pub struct OsvFeed {
    /// The batch query endpoint.
    url: String,
    /// The HTTP client, kept for the whole run.
    client: Client,
}

impl OsvFeed {
    /// Creates a new OsvFeed.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            url: url.to_string(),
            client: http::build_client(timeout)?,
        })
    }

    /// Sends the batch query and returns the CVEs found.
    async fn try_fetch(
        &self,
        limit: usize,
        since: DateTime<Utc>,
    ) -> Result<Vec<CveCandidate>, AdapterError> {
        trace!("Running OsvFeed::try_fetch()");
        let payload = json!({
            "queries": [{"published": since.to_rfc3339_opts(SecondsFormat::Secs, true)}]
        });
        debug!("Querying OSV at {} with {}", self.url, payload);
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let response = http::ensure_success(response).await?;
        let body = response.bytes().await?;
        parse_batch(&body, since, limit)
    }
}

#[async_trait]
impl FeedAdapter for OsvFeed {
    fn name(&self) -> &str {
        "osv"
    }

    async fn fetch(&self, limit: usize, window: Duration) -> Vec<CveCandidate> {
        trace!("Running OsvFeed::fetch()");
        match self.try_fetch(limit, window_start(window)).await {
            Ok(candidates) => {
                info!("OSV feed returned {} CVEs", candidates.len());
                candidates
            }
            Err(e) => {
                error!("Error while fetching the OSV feed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parses a batch response. Advisories that can't be read are skipped.
pub fn parse_batch(
    body: &[u8],
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<CveCandidate>, AdapterError> {
    trace!("Running osv::parse_batch()");
    let response: BatchResponse = serde_json::from_slice(body)?;
    let cve_regex = Regex::new(r"^CVE-\d{4}-\d{4,}$")
        .map_err(|e| AdapterError::Malformed(e.to_string()))?;
    let mut candidates = Vec::new();

    for result in response.results {
        for raw_vuln in result.vulns {
            let vuln: OsvVulnerability = match serde_json::from_value(raw_vuln) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping a malformed OSV advisory: {}", e);
                    continue;
                }
            };
            if vuln.id.trim().is_empty() {
                warn!("Skipping an OSV advisory without identifier");
                continue;
            }
            let date = vuln.published.as_deref().or(vuln.modified.as_deref());
            let published = match date.and_then(parse_timestamp) {
                Some(p) => p,
                None => {
                    warn!("Skipping {}, no valid publication date", vuln.id);
                    continue;
                }
            };
            if published < since {
                continue;
            }
            let id = vuln.cve_id(&cve_regex);
            candidates.push(CveCandidate::new(
                &id,
                published,
                &vuln.description(),
                "osv",
            ));
        }
    }

    Ok(most_recent_first(candidates, limit))
}

/// The response of the batch API, one result per query.
#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub results: Vec<BatchResult>,
}

/// The advisories matching one query, kept raw.
#[derive(Debug, Deserialize)]
pub struct BatchResult {
    #[serde(default)]
    pub vulns: Vec<Value>,
}

/// An OSV advisory.
#[derive(Debug, Deserialize)]
pub struct OsvVulnerability {
    /// Example: GHSA-xxxx-xxxx-xxxx
    pub id: String,
    pub published: Option<String>,
    pub modified: Option<String>,
    pub summary: Option<String>,
    pub details: Option<String>,
    /// Other identifiers of the same advisory.
    /// Example: ["CVE-2024-1234"]
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl OsvVulnerability {
    /// The CVE identifier of the advisory: its own id if it's a CVE, else
    /// the first CVE alias, else its own id.
    pub fn cve_id(&self, cve_regex: &Regex) -> String {
        let id = self.id.trim();
        if cve_regex.is_match(id) {
            return id.to_string();
        }
        self.aliases
            .iter()
            .map(|alias| alias.trim())
            .find(|alias| cve_regex.is_match(alias))
            .unwrap_or(id)
            .to_string()
    }

    /// The details if any, the summary otherwise.
    pub fn description(&self) -> String {
        self.details
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(self.summary.as_deref())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}
