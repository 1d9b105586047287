//! A local catalog of bug bounty writeups.
//!
//! The catalog is a JSON array of writeups. The first writeup mentioning a
//! CVE is attached to its report, with the summarizer's insight about it.

use std::fs;
use std::path::Path;

use log::{debug, trace};
use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;

/// A writeup as stored in the catalog.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WriteupEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// The text of the writeup.
    #[serde(default)]
    pub content: String,
}

/// The catalog of writeups. Empty when no file is given.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteupIndex {
    entries: Vec<WriteupEntry>,
}

impl WriteupIndex {
    /// Creates an index from a list of writeups.
    pub fn new(entries: Vec<WriteupEntry>) -> Self {
        WriteupIndex { entries }
    }

    /// Reads the catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        trace!("Running WriteupIndex::load()");
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<WriteupEntry> =
            serde_json::from_str(&content).map_err(|source| ConfigError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("{} writeups read from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    /// Finds the first writeup mentioning the CVE in its title, its tags or
    /// its content. The match ignores case and needs whole words, so that
    /// CVE-2024-1234 doesn't match CVE-2024-12345.
    pub fn find(&self, cve_id: &str) -> Option<&WriteupEntry> {
        if self.entries.is_empty() || cve_id.trim().is_empty() {
            return None;
        }
        let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(cve_id.trim()))).ok()?;
        self.entries.iter().find(|entry| {
            regex.is_match(&entry.title)
                || entry.tags.iter().any(|tag| regex.is_match(tag))
                || regex.is_match(&entry.content)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entry(title: &str, tags: &[&str], content: &str) -> WriteupEntry {
        WriteupEntry {
            title: title.to_string(),
            url: format!("https://example.com/{}", title.len()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            content: content.to_string(),
        }
    }

    #[test]
    fn find_matches_title_tags_and_content() {
        let index = WriteupIndex::new(vec![
            entry("Unrelated", &[], "nothing"),
            entry("Next.js Middleware Hack", &["cve-2025-29927"], ""),
            entry("Zimbra", &[], "Exploiting CVE-2024-45519 step by step"),
        ]);
        assert_eq!(
            index.find("CVE-2025-29927").unwrap().title,
            "Next.js Middleware Hack"
        );
        assert_eq!(index.find("CVE-2024-45519").unwrap().title, "Zimbra");
        assert!(index.find("CVE-2024-0001").is_none());
    }

    #[test]
    fn find_needs_whole_identifiers() {
        let index = WriteupIndex::new(vec![entry("About CVE-2024-12345", &[], "")]);
        assert!(index.find("CVE-2024-1234").is_none());
        assert!(index.find("CVE-2024-12345").is_some());
    }

    #[test]
    fn load_reads_the_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"title": "T", "url": "https://example.com/t", "tags": ["CVE-2024-1"]}}]"#
        )
        .unwrap();
        let index = WriteupIndex::load(file.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.find("cve-2024-1").unwrap().content, "");
    }
}
