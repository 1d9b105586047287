/// This module implements a feed which downloads the recent CVEs published
/// by the NVD, as a gzipped JSON document.
/// https://nvd.nist.gov/vuln/data-feeds
use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use log::{debug, error, info, trace, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AdapterError, ConfigError};
use crate::feeds::{most_recent_first, parse_timestamp, window_start, FeedAdapter};
use crate::http;
use crate::models::CveCandidate;

/// The default location of the NVD recent feed.
pub const DEFAULT_NVD_FEED_URL: &str =
    "https://nvd.nist.gov/feeds/json/cve/2.0/nvdcve-2.0-recent.json.gz";

/// The two bytes starting any gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// This structs represents the NVD bulk feed.
pub struct NvdFeed {
    /// Where to download the archive.
    url: String,
    /// The HTTP client, kept for the whole run.
    client: Client,
}

impl NvdFeed {
    /// Creates a new NvdFeed.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            url: url.to_string(),
            client: http::build_client(timeout)?,
        })
    }

    /// Downloads the archive and returns the CVEs it contains.
    async fn try_fetch(
        &self,
        limit: usize,
        since: DateTime<Utc>,
    ) -> Result<Vec<CveCandidate>, AdapterError> {
        trace!("Running NvdFeed::try_fetch()");
        debug!("Downloading the NVD feed from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        let response = http::ensure_success(response).await?;
        let archive = response.bytes().await?.to_vec();
        debug!("NVD feed downloaded, {} bytes", archive.len());

        // Inflating and parsing several MB of JSON is CPU work
        tokio::task::spawn_blocking(move || {
            let document = decompress(&archive)?;
            parse_feed(&document, since, limit)
        })
        .await
        .map_err(|e| AdapterError::Malformed(format!("the decoding task failed: {}", e)))?
    }
}

#[async_trait]
impl FeedAdapter for NvdFeed {
    fn name(&self) -> &str {
        "nvd"
    }

    async fn fetch(&self, limit: usize, window: Duration) -> Vec<CveCandidate> {
        trace!("Running NvdFeed::fetch()");
        match self.try_fetch(limit, window_start(window)).await {
            Ok(candidates) => {
                info!("NVD feed returned {} CVEs", candidates.len());
                candidates
            }
            Err(e) => {
                error!("Error while fetching the NVD feed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Inflates the archive. Data which is not gzipped is returned as is, since
/// a proxy or the HTTP layer may already have decoded it.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, AdapterError> {
    if !data.starts_with(&GZIP_MAGIC) {
        trace!("The NVD feed is not gzipped");
        return Ok(data.to_vec());
    }
    let mut decoder = GzDecoder::new(data);
    let mut document = Vec::new();
    decoder
        .read_to_end(&mut document)
        .map_err(|e| AdapterError::Malformed(format!("invalid gzip archive: {}", e)))?;
    Ok(document)
}

/// Parses the JSON feed, keeping the CVEs published since `since`.
///
/// A record that doesn't match the expected schema is skipped, the other
/// ones are kept.
pub fn parse_feed(
    document: &[u8],
    since: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<CveCandidate>, AdapterError> {
    trace!("Running nvd::parse_feed()");
    let feed: FeedDocument = serde_json::from_slice(document)?;
    let mut candidates = Vec::new();

    for raw_vulnerability in feed.vulnerabilities {
        let vulnerability: Vulnerability = match serde_json::from_value(raw_vulnerability) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping a malformed NVD record: {}", e);
                continue;
            }
        };
        let cve = vulnerability.cve;
        if cve.id.trim().is_empty() {
            warn!("Skipping an NVD record without identifier");
            continue;
        }
        let published = match parse_timestamp(&cve.published) {
            Some(p) => p,
            None => {
                warn!(
                    "Skipping {}, invalid publication date: {}",
                    cve.id, cve.published
                );
                continue;
            }
        };
        if published < since {
            continue;
        }
        let description = cve.english_description();
        candidates.push(CveCandidate::new(
            cve.id.trim(),
            published,
            &description,
            "nvd",
        ));
    }

    Ok(most_recent_first(candidates, limit))
}

/// Represents the main JSON object of the NVD 2.0 feed.
/// The records are kept raw so that one bad record doesn't make the whole
/// document invalid.
#[derive(Debug, Deserialize)]
pub struct FeedDocument {
    /// The list of vulnerabilities.
    #[serde(default)]
    pub vulnerabilities: Vec<Value>,
}

/// Represents a vulnerability as part of the FeedDocument.
#[derive(Debug, Deserialize)]
pub struct Vulnerability {
    /// The CVE.
    pub cve: CVE,
}

/// Represents a CVE as returned as part of the Vulnerability.
#[derive(Debug, Deserialize)]
pub struct CVE {
    /// The CVE identifier.
    /// Example: CVE-2012-6708
    pub id: String,
    /// When the CVE was published.
    /// Example: 2018-01-18T23:29:00.213
    pub published: String,
    /// The status of the vulnerability.
    /// Example: Modified
    #[serde(rename = "vulnStatus", default)]
    pub vuln_status: Option<String>,
    /// The descriptions of the CVE.
    /// Example: [{"lang": "en", "value": "jQuery before 1.9.0 is vulnerable to [...]"}]
    #[serde(default)]
    pub descriptions: Vec<CVEDescription>,
}

impl CVE {
    /// The English description, or the first one if none is in English.
    pub fn english_description(&self) -> String {
        self.descriptions
            .iter()
            .find(|d| d.lang == "en")
            .or_else(|| self.descriptions.first())
            .map(|d| d.value.trim().to_string())
            .unwrap_or_default()
    }
}

/// Represents a description as part of a CVE.
#[derive(Debug, Deserialize)]
pub struct CVEDescription {
    /// The language of the description.
    /// Example: en
    pub lang: String,
    /// The content of the description.
    /// Example: jQuery before 1.9.0 is vulnerable to [...]
    pub value: String,
}
