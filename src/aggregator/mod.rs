//! The aggregator drives a run.
//!
//! It selects the CVEs among the feeds, derives a query for each of them,
//! asks every configured engine for targets, optionally scans the targets,
//! and merges everything in one [`CveReport`] per CVE.
//!
//! Nothing that happens in a feed, an engine, a scanner or the summarizer can
//! stop the aggregator: every failure ends up as a placeholder in the report.

pub mod query;
pub mod report;
pub mod selection;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::engines::{Engines, TargetAdapter};
use crate::error::AdapterError;
use crate::feeds::FeedAdapter;
use crate::models::{
    CveCandidate, CveReport, EngineOutcome, ScanFinding, SearchQuery, TargetSet, Writeup,
};
use crate::scanners::ActiveScanAdapter;
use crate::summarizers::Summarizer;
use crate::writeups::WriteupIndex;

pub use self::query::{QueryRule, QueryRules};
pub use self::report::build_report;
pub use self::selection::merge_candidates;

/// The text used instead of a summary when the run is cancelled.
pub const CANCELLED_SUMMARY: &str = "Summary skipped, the run was cancelled.";

/// The tuning of the aggregator.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Only CVEs published during this window are fetched.
    pub window: Duration,
    /// The limit of one engine call.
    pub engine_timeout: Duration,
    /// How many CVEs are processed at the same time.
    pub cve_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            window: Duration::from_secs(86_400),
            engine_timeout: Duration::from_secs(20),
            cve_workers: 2,
        }
    }
}

/// Represents the aggregation pipeline.
pub struct Aggregator {
    /// The feeds, in priority order.
    feeds: Vec<Box<dyn FeedAdapter>>,
    /// The engines having credentials.
    engines: Vec<Box<dyn TargetAdapter>>,
    /// The names of the engines without credentials.
    unconfigured_engines: Vec<String>,
    /// The active scanners. Empty if no scan must be done.
    scanners: Vec<Box<dyn ActiveScanAdapter>>,
    summarizer: Box<dyn Summarizer>,
    writeups: WriteupIndex,
    rules: QueryRules,
    settings: Settings,
    /// Once cancelled, no new call is started.
    cancel: CancellationToken,
}

impl Aggregator {
    /// Creates an aggregator without feed, engine nor scanner.
    pub fn new(summarizer: Box<dyn Summarizer>) -> Self {
        Aggregator {
            feeds: Vec::new(),
            engines: Vec::new(),
            unconfigured_engines: Vec::new(),
            scanners: Vec::new(),
            summarizer,
            writeups: WriteupIndex::default(),
            rules: QueryRules::default(),
            settings: Settings::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Adds a feed, after the ones already added.
    pub fn with_feed(mut self, feed: Box<dyn FeedAdapter>) -> Self {
        self.feeds.push(feed);
        self
    }

    /// Adds a configured engine.
    pub fn with_engine(mut self, engine: Box<dyn TargetAdapter>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Declares an engine which has no credentials.
    pub fn with_unconfigured_engine(mut self, name: &str) -> Self {
        self.unconfigured_engines.push(name.to_string());
        self
    }

    /// Adds all the engines of a run.
    pub fn with_engines(mut self, engines: Engines) -> Self {
        self.engines.extend(engines.configured);
        self.unconfigured_engines.extend(engines.unconfigured);
        self
    }

    /// Adds an active scanner.
    pub fn with_scanner(mut self, scanner: Box<dyn ActiveScanAdapter>) -> Self {
        self.scanners.push(scanner);
        self
    }

    pub fn with_query_rules(mut self, rules: QueryRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_writeups(mut self, writeups: WriteupIndex) -> Self {
        self.writeups = writeups;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Uses the given token to know when the run is cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The token cancelling the run.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Selects the CVEs to process.
    ///
    /// Without preferred source, all the feeds are fetched and merged. With
    /// one, the preferred feed is tried first, then the others in order, and
    /// the first one returning something is used. In both cases, duplicates
    /// are merged and the list is sorted, most recent first.
    pub async fn select_candidates(
        &self,
        limit: usize,
        preferred_source: Option<&str>,
    ) -> Vec<CveCandidate> {
        trace!("Running Aggregator::select_candidates()");
        let window = self.settings.window;

        let preferred = match preferred_source {
            Some(p) => p,
            None => {
                debug!("Fetching the {} feeds", self.feeds.len());
                let batches =
                    join_all(self.feeds.iter().map(|feed| feed.fetch(limit, window))).await;
                return merge_candidates(batches, limit);
            }
        };

        if !self.feeds.iter().any(|feed| feed.name() == preferred) {
            warn!(
                "Unknown source {}, using the feeds in their configured order",
                preferred
            );
        }
        let ordered = self
            .feeds
            .iter()
            .filter(|feed| feed.name() == preferred)
            .chain(self.feeds.iter().filter(|feed| feed.name() != preferred));

        for feed in ordered {
            if self.cancel.is_cancelled() {
                warn!("Run cancelled, no more feed is fetched");
                break;
            }
            let batch = feed.fetch(limit, window).await;
            if batch.is_empty() {
                warn!("Feed {} has nothing, trying the next one", feed.name());
                continue;
            }
            info!("Using {} CVEs from {}", batch.len(), feed.name());
            return merge_candidates(vec![batch], limit);
        }
        Vec::new()
    }

    /// Derives the search query from a description.
    pub fn derive_query(&self, description: &str) -> SearchQuery {
        self.rules.derive(description)
    }

    /// Asks every configured engine for the targets matching the query.
    ///
    /// Each engine has its own entry: its hosts, or the reason it failed.
    /// Engines without credentials have the unconfigured marker.
    pub async fn discover_targets(&self, query: &SearchQuery) -> TargetSet {
        trace!("Running Aggregator::discover_targets()");
        let mut targets = TargetSet::new();
        for name in &self.unconfigured_engines {
            targets.insert(name, EngineOutcome::Unconfigured);
        }

        if self.cancel.is_cancelled() {
            for engine in &self.engines {
                targets.insert(
                    engine.name(),
                    EngineOutcome::Failed(AdapterError::Cancelled.to_string()),
                );
            }
            return targets;
        }

        let timeout = self.settings.engine_timeout;
        let outcomes = join_all(self.engines.iter().map(|engine| async move {
            let search = AssertUnwindSafe(engine.search(query)).catch_unwind();
            let outcome = match tokio::time::timeout(timeout, search).await {
                Ok(Ok(Ok(hosts))) => {
                    info!("{} found {} hosts for {}", engine.name(), hosts.len(), query);
                    EngineOutcome::Hosts(hosts)
                }
                Ok(Ok(Err(e))) => {
                    error!("{} failed: {}", engine.name(), e);
                    EngineOutcome::Failed(e.to_string())
                }
                Ok(Err(_)) => {
                    error!("{} panicked", engine.name());
                    EngineOutcome::Failed("the engine crashed".to_string())
                }
                Err(_) => {
                    error!("{} timed out", engine.name());
                    EngineOutcome::Failed(AdapterError::Timeout(timeout).to_string())
                }
            };
            (engine.name(), outcome)
        }))
        .await;

        for (name, outcome) in outcomes {
            targets.insert(name, outcome);
        }
        targets
    }

    /// Runs every scanner on the hosts found, deduplicated across engines.
    /// Returns None when no scanner is configured.
    pub async fn run_scans(
        &self,
        targets: &TargetSet,
        vulnerability_ref: Option<&str>,
    ) -> Option<BTreeMap<String, ScanFinding>> {
        trace!("Running Aggregator::run_scans()");
        if self.scanners.is_empty() {
            return None;
        }
        let hosts = targets.unique_hosts();
        let mut findings = BTreeMap::new();

        // One scanner at a time, each one bounds its own processes
        for scanner in &self.scanners {
            let finding = if self.cancel.is_cancelled() {
                ScanFinding::from_error(&AdapterError::Cancelled.to_string())
            } else if hosts.is_empty() {
                debug!("No host to scan with {}", scanner.name());
                ScanFinding::new()
            } else {
                info!("Scanning {} hosts with {}", hosts.len(), scanner.name());
                scanner.scan(&hosts, vulnerability_ref).await
            };
            findings.insert(scanner.name().to_string(), finding);
        }
        Some(findings)
    }

    /// Asks the summarizer about the CVE.
    async fn summarize(&self, candidate: &CveCandidate) -> String {
        if self.cancel.is_cancelled() {
            return CANCELLED_SUMMARY.to_string();
        }
        self.summarizer
            .summarize(&candidate.id, &candidate.description)
            .await
    }

    /// Finds a writeup about the CVE and asks the summarizer about it.
    async fn find_writeup(&self, cve_id: &str) -> Option<Writeup> {
        let entry = self.writeups.find(cve_id)?;
        debug!("Writeup found for {}: {}", cve_id, entry.title);
        let insight = if self.cancel.is_cancelled() {
            CANCELLED_SUMMARY.to_string()
        } else {
            self.summarizer
                .classify_writeup(&entry.title, &entry.content, &entry.tags)
                .await
        };
        Some(Writeup {
            title: entry.title.clone(),
            tags: entry.tags.clone(),
            url: entry.url.clone(),
            insight,
        })
    }

    /// Processes one CVE from end to end.
    pub async fn process(&self, candidate: &CveCandidate) -> CveReport {
        trace!("Running Aggregator::process() for {}", candidate.id);
        let query = self.derive_query(&candidate.description);
        info!("{}: searching targets with {}", candidate.id, query);

        let (summary, targets, writeup) = tokio::join!(
            self.summarize(candidate),
            self.discover_targets(&query),
            self.find_writeup(&candidate.id),
        );
        let scan_findings = self.run_scans(&targets, Some(&candidate.id)).await;

        build_report(
            candidate,
            &summary,
            &query,
            &targets,
            scan_findings.as_ref(),
            writeup.as_ref(),
        )
    }

    /// Runs the whole pipeline. `on_report` is called for each report, as
    /// soon as it's ready. Returns the number of reports produced.
    ///
    /// Once the run is cancelled, the CVEs not started yet are skipped; the
    /// ones in progress are finished.
    pub async fn run<F>(&self, limit: usize, preferred_source: Option<&str>, mut on_report: F) -> usize
    where
        F: FnMut(&CveReport),
    {
        trace!("Running Aggregator::run()");
        let candidates = self.select_candidates(limit, preferred_source).await;
        info!("{} CVEs selected", candidates.len());

        let mut reports = stream::iter(candidates.iter())
            .map(|candidate| async move {
                if self.cancel.is_cancelled() {
                    warn!("Run cancelled, {} is skipped", candidate.id);
                    return None;
                }
                Some(self.process(candidate).await)
            })
            .buffer_unordered(self.settings.cve_workers.max(1));

        let mut produced = 0;
        while let Some(report) = reports.next().await {
            if let Some(report) = report {
                on_report(&report);
                produced += 1;
            }
        }
        info!("{} reports produced", produced);
        produced
    }
}
