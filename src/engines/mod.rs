//! This module declares the host search engines.
//!
//! An engine takes the query derived from a CVE and returns the hosts it
//! knows to match it. All the engines share the [`TargetAdapter`] interface;
//! which ones exist for a run depends only on the credentials found in the
//! [`Config`](crate::config::Config).

pub mod censys;
pub mod fofa;
pub mod shodan;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, trace};

use crate::config::EngineCredentials;
use crate::error::{AdapterError, ConfigError};
use crate::models::SearchQuery;

use self::censys::CensysEngine;
use self::fofa::FofaEngine;
use self::shodan::ShodanEngine;

/// A common interface between all the host search engines.
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    /// The name of the engine, used as key in the reports.
    fn name(&self) -> &'static str;

    /// Searches the hosts matching the query.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>, AdapterError>;
}

/// The engines of a run, split by whether they could be created.
pub struct Engines {
    /// The engines having credentials.
    pub configured: Vec<Box<dyn TargetAdapter>>,
    /// The names of the engines without credentials.
    pub unconfigured: Vec<String>,
}

impl Engines {
    /// Creates the engines having credentials.
    pub fn from_credentials(
        credentials: &EngineCredentials,
        timeout: Duration,
        max_hosts: usize,
    ) -> Result<Self, ConfigError> {
        trace!("Running Engines::from_credentials()");
        let mut engines = Engines {
            configured: Vec::new(),
            unconfigured: Vec::new(),
        };

        match &credentials.shodan {
            Some(c) => engines
                .configured
                .push(Box::new(ShodanEngine::new(c, timeout, max_hosts)?)),
            None => engines.unconfigured.push(shodan::NAME.to_string()),
        }
        match &credentials.censys {
            Some(c) => engines
                .configured
                .push(Box::new(CensysEngine::new(c, timeout, max_hosts)?)),
            None => engines.unconfigured.push(censys::NAME.to_string()),
        }
        match &credentials.fofa {
            Some(c) => engines
                .configured
                .push(Box::new(FofaEngine::new(c, timeout, max_hosts)?)),
            None => engines.unconfigured.push(fofa::NAME.to_string()),
        }

        let names: Vec<&str> = engines.configured.iter().map(|e| e.name()).collect();
        info!("Configured search engines: {:?}", names);
        debug!("Unconfigured search engines: {:?}", engines.unconfigured);
        Ok(engines)
    }
}

/// Keeps the first `max` hosts, without empty strings nor duplicates.
pub(crate) fn clean_hosts<I>(hosts: I, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut cleaned: Vec<String> = Vec::new();
    for host in hosts {
        let host = host.trim();
        if host.is_empty() || cleaned.iter().any(|h| h == host) {
            continue;
        }
        cleaned.push(host.to_string());
        if cleaned.len() >= max {
            break;
        }
    }
    cleaned
}
