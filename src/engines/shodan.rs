//! The Shodan engine.
//! https://developer.shodan.io/api

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Client;
use serde::Deserialize;

use super::{clean_hosts, TargetAdapter};
use crate::config::ShodanCredentials;
use crate::error::{AdapterError, ConfigError};
use crate::http;
use crate::models::SearchQuery;

/// The name of the engine.
pub const NAME: &str = "shodan";

/// The default API location.
pub const DEFAULT_BASE_URL: &str = "https://api.shodan.io";

/// Searches hosts with the Shodan host search API.
pub struct ShodanEngine {
    api_key: String,
    base_url: String,
    max_hosts: usize,
    client: Client,
}

impl ShodanEngine {
    /// Creates a new ShodanEngine.
    pub fn new(
        credentials: &ShodanCredentials,
        timeout: Duration,
        max_hosts: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: credentials.api_key.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_hosts,
            client: http::build_client(timeout)?,
        })
    }

    /// Uses another API location.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TargetAdapter for ShodanEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>, AdapterError> {
        trace!("Running ShodanEngine::search()");
        let url = format!("{}/shodan/host/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("query", query.as_str())])
            .send()
            .await?;
        let response = http::ensure_success(response).await?;
        let results: SearchResponse = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(e) = results.error {
            return Err(AdapterError::Malformed(e));
        }
        debug!("Shodan found {} matches in total", results.total.unwrap_or(0));

        Ok(clean_hosts(
            results.matches.into_iter().filter_map(|m| m.ip_str),
            self.max_hosts,
        ))
    }
}

/// The response of the host search API.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<Match>,
    total: Option<u64>,
    error: Option<String>,
}

/// One banner returned by the host search API.
#[derive(Debug, Deserialize)]
struct Match {
    ip_str: Option<String>,
}
