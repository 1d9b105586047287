//! Reconciliation of the CVEs coming from several feeds.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::feeds::most_recent_first;
use crate::models::CveCandidate;

/// Merges batches of candidates into one list without duplicates.
///
/// Candidates sharing an identifier are the same CVE. The first one seen is
/// kept, unless a later one has a strictly longer description, in which case
/// the later one replaces it. The result is sorted by publication date, most
/// recent first, and truncated to `limit`.
pub fn merge_candidates(batches: Vec<Vec<CveCandidate>>, limit: usize) -> Vec<CveCandidate> {
    trace!("Running selection::merge_candidates()");
    let mut merged: Vec<CveCandidate> = Vec::new();
    // CVE id -> position in merged
    let mut positions: HashMap<String, usize> = HashMap::new();

    for candidate in batches.into_iter().flatten() {
        if candidate.id.trim().is_empty() {
            warn!("Dropping a candidate without identifier from {}", candidate.source);
            continue;
        }
        match positions.get(&candidate.id) {
            Some(&position) => {
                let kept = &mut merged[position];
                if candidate.description.chars().count() > kept.description.chars().count() {
                    debug!(
                        "{}: the description from {} is more complete than the one from {}",
                        candidate.id, candidate.source, kept.source
                    );
                    *kept = candidate;
                }
            }
            None => {
                positions.insert(candidate.id.clone(), merged.len());
                merged.push(candidate);
            }
        }
    }

    most_recent_first(merged, limit)
}
