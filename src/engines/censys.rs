//! The Censys engine, using the Search API v2.
//! https://search.censys.io/api

use std::time::Duration;

use async_trait::async_trait;
use log::trace;
use reqwest::Client;
use serde::Deserialize;

use super::{clean_hosts, TargetAdapter};
use crate::config::CensysCredentials;
use crate::error::{AdapterError, ConfigError};
use crate::http;
use crate::models::SearchQuery;

/// The name of the engine.
pub const NAME: &str = "censys";

/// The default API location.
pub const DEFAULT_BASE_URL: &str = "https://search.censys.io";

/// Searches hosts with the Censys hosts search API.
pub struct CensysEngine {
    api_id: String,
    api_secret: String,
    base_url: String,
    max_hosts: usize,
    client: Client,
}

impl CensysEngine {
    /// Creates a new CensysEngine.
    pub fn new(
        credentials: &CensysCredentials,
        timeout: Duration,
        max_hosts: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_id: credentials.api_id.clone(),
            api_secret: credentials.api_secret.clone(),
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
impl TargetAdapter for CensysEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>, AdapterError> {
        trace!("Running CensysEngine::search()");
        let url = format!("{}/api/v2/hosts/search", self.base_url);
        let per_page = self.max_hosts.to_string();
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_id, Some(&self.api_secret))
            .query(&[("q", query.as_str()), ("per_page", per_page.as_str())])
            .send()
            .await?;
        let response = http::ensure_success(response).await?;
        let results: SearchResponse = serde_json::from_slice(&response.bytes().await?)?;
        let result = results.result.ok_or_else(|| {
            AdapterError::Malformed("Censys answered without a result object".to_string())
        })?;

        Ok(clean_hosts(
            result.hits.into_iter().filter_map(|hit| hit.ip),
            self.max_hosts,
        ))
    }
}

/// The response of the hosts search API.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    ip: Option<String>,
}
