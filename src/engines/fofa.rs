//! The FOFA engine.
//! FOFA expects the query base64 encoded, and answers with rows of fields
//! (host, ip, port by default).
//! https://en.fofa.info/api

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::trace;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{clean_hosts, TargetAdapter};
use crate::config::FofaCredentials;
use crate::error::{AdapterError, ConfigError};
use crate::http;
use crate::models::SearchQuery;

/// The name of the engine.
pub const NAME: &str = "fofa";

/// The default API location.
pub const DEFAULT_BASE_URL: &str = "https://fofa.info";

/// Searches hosts with the FOFA search API.
pub struct FofaEngine {
    email: String,
    key: String,
    base_url: String,
    max_hosts: usize,
    client: Client,
}

impl FofaEngine {
    /// Creates a new FofaEngine.
    pub fn new(
        credentials: &FofaCredentials,
        timeout: Duration,
        max_hosts: usize,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            email: credentials.email.clone(),
            key: credentials.key.clone(),
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
impl TargetAdapter for FofaEngine {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>, AdapterError> {
        trace!("Running FofaEngine::search()");
        let url = format!("{}/api/v1/search/all", self.base_url);
        let qbase64 = BASE64.encode(query.as_str());
        let size = self.max_hosts.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("email", self.email.as_str()),
                ("key", self.key.as_str()),
                ("qbase64", qbase64.as_str()),
                ("size", size.as_str()),
            ])
            .send()
            .await?;
        let response = http::ensure_success(response).await?;
        let results: SearchResponse = serde_json::from_slice(&response.bytes().await?)?;
        // FOFA reports errors with a 200 status
        if results.error {
            return Err(AdapterError::Malformed(
                results
                    .errmsg
                    .unwrap_or_else(|| "unknown FOFA error".to_string()),
            ));
        }

        Ok(clean_hosts(
            results.results.iter().filter_map(row_host),
            self.max_hosts,
        ))
    }
}

/// The host of a result row: the row itself when it's a string, its first
/// field when it's an array.
fn row_host(row: &Value) -> Option<String> {
    match row {
        Value::String(host) => Some(host.clone()),
        Value::Array(fields) => fields.first()?.as_str().map(|s| s.to_string()),
        _ => None,
    }
}

/// The response of the search API.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: bool,
    errmsg: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_host_reads_strings_and_arrays() {
        assert_eq!(
            row_host(&json!(["203.0.113.5:443", "203.0.113.5", "443"])),
            Some("203.0.113.5:443".to_string())
        );
        assert_eq!(
            row_host(&json!("203.0.113.6")),
            Some("203.0.113.6".to_string())
        );
        assert_eq!(row_host(&json!([])), None);
        assert_eq!(row_host(&json!({"host": "x"})), None);
    }
}
