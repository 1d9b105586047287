//! In this module are declared the entities manipulated by this program

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use clap::{builder::PossibleValue, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Represents a CVE as returned by a feed, before any enrichment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CveCandidate {
    /// The CVE identifier.
    /// Example: CVE-2025-29927
    pub id: String,
    /// When the CVE was published.
    pub published: DateTime<Utc>,
    /// The description of the vulnerability.
    pub description: String,
    /// The name of the feed the record comes from.
    pub source: String,
}

impl CveCandidate {
    /// Creates a new CveCandidate
    pub fn new(id: &str, published: DateTime<Utc>, description: &str, source: &str) -> Self {
        CveCandidate {
            id: id.to_string(),
            published,
            description: description.to_string(),
            source: source.to_string(),
        }
    }
}

/// The query sent to the host search engines for one CVE.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Creates a new SearchQuery
    pub fn new(query: &str) -> Self {
        SearchQuery(query.to_string())
    }

    /// The query as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a host search engine contributed for one query.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOutcome {
    /// The engine answered. The list may be empty.
    Hosts(Vec<String>),
    /// The engine is configured but the call failed.
    Failed(String),
    /// No credentials were provided for the engine, it was never called.
    Unconfigured,
}

impl EngineOutcome {
    /// Whether the engine was configured.
    pub fn is_configured(&self) -> bool {
        !matches!(self, EngineOutcome::Unconfigured)
    }
}

/// The targets found by every known engine, keyed by engine name.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TargetSet {
    engines: BTreeMap<String, EngineOutcome>,
}

impl TargetSet {
    /// Creates an empty TargetSet
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outcome of an engine, replacing any previous one.
    pub fn insert(&mut self, engine: &str, outcome: EngineOutcome) {
        self.engines.insert(engine.to_string(), outcome);
    }

    /// Get the outcome of an engine.
    pub fn get(&self, engine: &str) -> Option<&EngineOutcome> {
        self.engines.get(engine)
    }

    /// Iterates over all the entries, sorted by engine name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EngineOutcome)> {
        self.engines.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over the engines that were configured, successful or not.
    pub fn configured(&self) -> impl Iterator<Item = (&str, &EngineOutcome)> {
        self.iter().filter(|(_, outcome)| outcome.is_configured())
    }

    /// Names of the engines that were not configured.
    pub fn unconfigured(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, outcome)| !outcome.is_configured())
            .map(|(name, _)| name)
            .collect()
    }

    /// All the hosts found, deduplicated across engines.
    /// The order is the one of the first appearance.
    pub fn unique_hosts(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::new();
        for (_, outcome) in self.iter() {
            if let EngineOutcome::Hosts(list) = outcome {
                for host in list {
                    if seen.insert(host.as_str()) {
                        hosts.push(host.clone());
                    }
                }
            }
        }
        hosts
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// The result of one active scanner: host -> finding payload.
/// A failure is stored under the [`ScanFinding::ERROR_KEY`] entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScanFinding {
    entries: BTreeMap<String, Value>,
}

impl ScanFinding {
    /// The key holding the error message.
    pub const ERROR_KEY: &'static str = "error";

    /// Creates an empty ScanFinding
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ScanFinding holding only an error.
    pub fn from_error(message: &str) -> Self {
        let mut finding = Self::new();
        finding.record_error(message);
        finding
    }

    /// Stores the payload found for a host.
    pub fn insert(&mut self, host: &str, payload: Value) {
        self.entries.insert(host.to_string(), payload);
    }

    /// Stores the payload found for a host, next to what is already stored
    /// for it: arrays are concatenated, a single payload is pushed.
    pub fn append(&mut self, host: &str, payload: Value) {
        match self.entries.get_mut(host) {
            Some(Value::Array(existing)) => match payload {
                Value::Array(values) => existing.extend(values),
                value => existing.push(value),
            },
            Some(existing) => {
                let previous = existing.take();
                *existing = match payload {
                    Value::Array(mut values) => {
                        values.insert(0, previous);
                        Value::Array(values)
                    }
                    value => Value::Array(vec![previous, value]),
                };
            }
            None => self.insert(host, payload),
        }
    }

    /// Records an error. Several errors are concatenated in the single
    /// error entry.
    pub fn record_error(&mut self, message: &str) {
        let merged = match self.error() {
            Some(previous) => format!("{}; {}", previous, message),
            None => message.to_string(),
        };
        self.entries
            .insert(Self::ERROR_KEY.to_string(), Value::String(merged));
    }

    /// The error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.entries.get(Self::ERROR_KEY).and_then(|v| v.as_str())
    }

    /// The payload for a host.
    pub fn get(&self, host: &str) -> Option<&Value> {
        self.entries.get(host)
    }

    /// Iterates over the host entries, the error entry excluded.
    pub fn hosts(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != Self::ERROR_KEY)
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A writeup related to the CVE, with the summarizer's take on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Writeup {
    /// The title of the writeup.
    pub title: String,
    /// Its tags.
    pub tags: Vec<String>,
    /// Where to read it.
    pub url: String,
    /// What the summarizer said about it.
    pub insight: String,
}

/// The merged record produced for one CVE, handed to the writers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CveReport {
    /// The CVE identifier.
    pub cve_id: String,
    /// The description of the vulnerability.
    pub description: String,
    /// When the CVE was published.
    pub published: DateTime<Utc>,
    /// The feed the CVE comes from.
    pub source: String,
    /// The text produced by the summarizer.
    pub summary: String,
    /// The query sent to the search engines.
    pub query: SearchQuery,
    /// The targets found by each engine.
    pub targets: TargetSet,
    /// The active scan results, keyed by scanner name.
    /// None if no scan was performed.
    pub scan_findings: Option<BTreeMap<String, ScanFinding>>,
    /// A related writeup, if one is known.
    pub writeup: Option<Writeup>,
}

/// An enum to match the available writers
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Writers {
    /// MarkdownWriter
    Markdown,
    /// JsonWriter
    Json,
    /// TextStdoutWriter
    TextStdout,
}

impl ValueEnum for Writers {
    /// Lists the variants available for clap
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Markdown, Self::Json, Self::TextStdout]
    }

    /// Map each value to a possible value in clap
    fn to_possible_value(&self) -> Option<PossibleValue> {
        match &self {
            Self::Markdown => Some(PossibleValue::new("markdown")),
            Self::Json => Some(PossibleValue::new("json")),
            Self::TextStdout => Some(PossibleValue::new("textstdout")),
        }
    }
}

/// An enum to match the available active scanners
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scanners {
    /// Nuclei, with the CVE template when one exists
    Nuclei,
    /// Nmap with the vuln scripts
    Nmap,
}

impl ValueEnum for Scanners {
    /// Lists the variants available for clap
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Nuclei, Self::Nmap]
    }

    /// Map each value to a possible value in clap
    fn to_possible_value(&self) -> Option<PossibleValue> {
        match &self {
            Self::Nuclei => Some(PossibleValue::new("nuclei")),
            Self::Nmap => Some(PossibleValue::new("nmap")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_hosts_keeps_first_appearance() {
        let mut targets = TargetSet::new();
        targets.insert(
            "censys",
            EngineOutcome::Hosts(vec!["198.51.100.5".to_string(), "192.0.2.1".to_string()]),
        );
        targets.insert("fofa", EngineOutcome::Failed("boom".to_string()));
        targets.insert(
            "shodan",
            EngineOutcome::Hosts(vec!["192.0.2.1".to_string(), "203.0.113.9".to_string()]),
        );

        assert_eq!(
            targets.unique_hosts(),
            vec!["198.51.100.5", "192.0.2.1", "203.0.113.9"]
        );
    }

    #[test]
    fn configured_skips_unconfigured_engines() {
        let mut targets = TargetSet::new();
        targets.insert("shodan", EngineOutcome::Unconfigured);
        targets.insert("censys", EngineOutcome::Hosts(Vec::new()));
        targets.insert("fofa", EngineOutcome::Failed("401".to_string()));

        let configured: Vec<&str> = targets.configured().map(|(name, _)| name).collect();
        assert_eq!(configured, vec!["censys", "fofa"]);
        assert_eq!(targets.unconfigured(), vec!["shodan"]);
    }

    #[test]
    fn target_set_serialization() {
        let mut targets = TargetSet::new();
        targets.insert("shodan", EngineOutcome::Unconfigured);
        targets.insert(
            "censys",
            EngineOutcome::Hosts(vec!["203.0.113.5".to_string()]),
        );
        targets.insert("fofa", EngineOutcome::Failed("quota".to_string()));

        let value = serde_json::to_value(&targets).unwrap();
        assert_eq!(
            value,
            json!({
                "shodan": "unconfigured",
                "censys": {"hosts": ["203.0.113.5"]},
                "fofa": {"failed": "quota"},
            })
        );
    }

    #[test]
    fn scan_finding_errors_are_merged() {
        let mut finding = ScanFinding::new();
        finding.insert("192.0.2.1", json!({"template-id": "CVE-2024-0001"}));
        finding.record_error("nuclei failed on 192.0.2.2");
        finding.record_error("nuclei failed on 192.0.2.3");

        assert_eq!(
            finding.error(),
            Some("nuclei failed on 192.0.2.2; nuclei failed on 192.0.2.3")
        );
        assert_eq!(finding.hosts().count(), 1);
        assert_eq!(finding.len(), 2);
    }

    #[test]
    fn scan_finding_from_error_has_a_single_entry() {
        let finding = ScanFinding::from_error("nmap not found");
        assert_eq!(finding.len(), 1);
        assert_eq!(
            serde_json::to_value(&finding).unwrap(),
            json!({"error": "nmap not found"})
        );
    }

    #[test]
    fn scan_finding_append_keeps_previous_matches() {
        let mut finding = ScanFinding::new();
        finding.append("http://192.0.2.1", json!([{"template-id": "a"}]));
        finding.append("http://192.0.2.1", json!([{"template-id": "b"}]));
        finding.append("192.0.2.9", json!({"open_ports": ["80/tcp"]}));
        finding.append("192.0.2.9", json!({"open_ports": ["443/tcp"]}));

        assert_eq!(
            finding.get("http://192.0.2.1"),
            Some(&json!([{"template-id": "a"}, {"template-id": "b"}]))
        );
        assert_eq!(
            finding.get("192.0.2.9"),
            Some(&json!([{"open_ports": ["80/tcp"]}, {"open_ports": ["443/tcp"]}]))
        );
    }
}
