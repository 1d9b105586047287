//! Derivation of the search engine query (the "dork") from a CVE.
//!
//! A table of rules maps keywords to hand written queries, more precise than
//! anything built from free text. The first rule whose keyword appears in
//! the description wins; without match, the beginning of the description is
//! used. The derivation is pure: the same description always gives the same
//! query.

use std::fs;
use std::path::Path;

use log::{debug, trace};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::SearchQuery;

/// How many characters of the description are used when no rule matches.
pub const FALLBACK_QUERY_CHARS: usize = 100;

/// A keyword and the query it maps to.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct QueryRule {
    /// Searched in the description, case sensitive.
    pub keyword: String,
    /// The query to use when the keyword is found.
    pub query: String,
}

impl QueryRule {
    /// Creates a new QueryRule
    pub fn new(keyword: &str, query: &str) -> Self {
        QueryRule {
            keyword: keyword.to_string(),
            query: query.to_string(),
        }
    }
}

/// The ordered table of rules.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryRules {
    rules: Vec<QueryRule>,
}

impl Default for QueryRules {
    /// The built-in rules.
    fn default() -> Self {
        Self::new(vec![
            QueryRule::new("Apache", r#"title:"Apache2 Ubuntu Default Page""#),
            QueryRule::new("Zimbra", "http.favicon.hash:1624375939"),
        ])
    }
}

impl QueryRules {
    /// Creates a table from a list of rules, in priority order.
    /// Rules with an empty keyword could match everything and are dropped.
    pub fn new(rules: Vec<QueryRule>) -> Self {
        let rules = rules
            .into_iter()
            .filter(|rule| !rule.keyword.is_empty())
            .collect();
        QueryRules { rules }
    }

    /// Reads the rules from a JSON file, an array of
    /// `{"keyword": "...", "query": "..."}` objects.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        trace!("Running QueryRules::load()");
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let rules: Vec<QueryRule> =
            serde_json::from_str(&content).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("{} query rules read from {}", rules.len(), path.display());
        Ok(Self::new(rules))
    }

    /// Derives the query for a description.
    pub fn derive(&self, description: &str) -> SearchQuery {
        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| description.contains(&rule.keyword))
        {
            trace!("Query rule {:?} matches", rule.keyword);
            return SearchQuery::new(&rule.query);
        }
        let fallback: String = description.chars().take(FALLBACK_QUERY_CHARS).collect();
        SearchQuery::new(&fallback)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn apache_gets_the_default_page_query() {
        let rules = QueryRules::default();
        let query = rules.derive("A path traversal in Apache HTTP Server 2.4.49 allows RCE");
        assert_eq!(query.as_str(), r#"title:"Apache2 Ubuntu Default Page""#);

        let other = rules.derive("Unrelated text first. Then Apache, then more text.");
        assert_eq!(other, query);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = QueryRules::default();
        let query = rules.derive("Zimbra Collaboration behind an Apache proxy");
        assert_eq!(query.as_str(), r#"title:"Apache2 Ubuntu Default Page""#);

        let query = rules.derive("Zimbra Collaboration Suite XSS");
        assert_eq!(query.as_str(), "http.favicon.hash:1624375939");
    }

    #[test]
    fn keywords_are_case_sensitive() {
        let query = QueryRules::default().derive("apache commons text");
        assert_eq!(query.as_str(), "apache commons text");
    }

    #[test]
    fn fallback_truncates_on_characters() {
        let description = "é".repeat(150);
        let query = QueryRules::default().derive(&description);
        assert_eq!(query.as_str().chars().count(), FALLBACK_QUERY_CHARS);

        let short = QueryRules::default().derive("short");
        assert_eq!(short.as_str(), "short");
    }

    #[test]
    fn derivation_is_deterministic() {
        let rules = QueryRules::default();
        let description = "Heap overflow in libfoo before 1.2.3 allows remote attackers to run code";
        assert_eq!(rules.derive(description), rules.derive(description));
    }

    #[test]
    fn rules_load_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"keyword": "Next.js", "query": "http.html:\"__NEXT_DATA__\""}},
               {{"keyword": "", "query": "everything"}}]"#
        )
        .unwrap();
        let rules = QueryRules::load(file.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules.derive("Middleware bypass in Next.js").as_str(),
            r#"http.html:"__NEXT_DATA__""#
        );
        // The built-in rules are replaced
        assert_eq!(rules.derive("Apache").as_str(), "Apache");
    }

    #[test]
    fn invalid_rules_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            QueryRules::load(file.path()),
            Err(ConfigError::InvalidJson { .. })
        ));
        assert!(matches!(
            QueryRules::load(Path::new("/nonexistent/rules.json")),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
