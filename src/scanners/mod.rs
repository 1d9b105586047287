//! The active scanners.
//!
//! A scanner runs an external tool against the hosts found by the engines.
//! The tool is run once per host, with a bounded number of processes at the
//! same time and a wall clock limit for each of them. A failing run never
//! makes the scanner fail: the failure is recorded in the
//! [`ScanFinding`] error entry, next to the hosts which were scanned fine.

pub mod nmap;
pub mod nuclei;

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, error, trace};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::ScanConfig;
use crate::error::AdapterError;
use crate::models::{ScanFinding, Scanners};

use self::nmap::NmapScanner;
use self::nuclei::NucleiScanner;

/// A common interface between all the active scanners.
#[async_trait]
pub trait ActiveScanAdapter: Send + Sync {
    /// The name of the scanner, used as key in the reports.
    fn name(&self) -> &'static str;

    /// Scans the hosts, optionally focusing on one vulnerability.
    async fn scan(&self, hosts: &[String], vulnerability_ref: Option<&str>) -> ScanFinding;
}

/// Creates the scanners selected in the configuration.
/// All of them share the same `workers` process slots.
pub fn from_config(config: &ScanConfig) -> Vec<Box<dyn ActiveScanAdapter>> {
    trace!("Running scanners::from_config()");
    let mut scanners: Vec<Box<dyn ActiveScanAdapter>> = Vec::new();
    // One pool of process slots for the whole run
    let permits = Arc::new(Semaphore::new(config.workers.max(1)));
    for kind in &config.scanners {
        let runner = ToolRunner::with_permits(
            match kind {
                Scanners::Nuclei => &config.nuclei_path,
                Scanners::Nmap => &config.nmap_path,
            },
            permits.clone(),
            config.workers,
            config.timeout,
        );
        match kind {
            Scanners::Nuclei => scanners.push(Box::new(NucleiScanner::new(runner))),
            Scanners::Nmap => scanners.push(Box::new(NmapScanner::new(runner))),
        }
    }
    scanners
}

/// Runs an external tool under the limits of the run.
#[derive(Clone, Debug)]
pub struct ToolRunner {
    /// The binary to run.
    binary: String,
    /// How many hosts are scanned at the same time.
    workers: usize,
    /// The process slots, possibly shared with other runners.
    permits: Arc<Semaphore>,
    /// The wall clock limit of one process.
    timeout: Duration,
}

impl ToolRunner {
    /// Creates a new ToolRunner with its own process slots.
    pub fn new(binary: &str, workers: usize, timeout: Duration) -> Self {
        let workers = workers.max(1);
        Self::with_permits(binary, Arc::new(Semaphore::new(workers)), workers, timeout)
    }

    /// Creates a ToolRunner drawing its process slots from `permits`.
    /// Every runner sharing the same permits counts against the same limit,
    /// whatever the number of CVEs processed at the same time.
    pub fn with_permits(
        binary: &str,
        permits: Arc<Semaphore>,
        workers: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.to_string(),
            workers: workers.max(1),
            permits,
            timeout,
        }
    }

    /// Runs the tool once and returns its standard output.
    ///
    /// A missing binary, a failure exit status or an expired timeout are
    /// errors. An expired process is killed.
    pub async fn run(&self, args: &[String]) -> Result<String, AdapterError> {
        trace!("Running ToolRunner::run()");
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AdapterError::Cancelled)?;
        debug!("Running {} {}", self.binary, args.join(" "));
        let output_future = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output_future).await {
            Err(_) => return Err(AdapterError::Timeout(self.timeout)),
            Ok(Err(e)) => {
                return Err(AdapterError::Tool {
                    tool: self.binary.clone(),
                    message: e.to_string(),
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr)
            };
            return Err(AdapterError::Tool {
                tool: self.binary.clone(),
                message,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Calls `scan_one` for each host, with at most `workers` calls at the
    /// same time, and gathers everything in one [`ScanFinding`].
    ///
    /// `scan_one` returns the entries to store for a host. The errors are
    /// merged, sorted by host, in the error entry.
    pub async fn for_each_host<'a, F, Fut>(&self, hosts: &'a [String], scan_one: F) -> ScanFinding
    where
        F: Fn(&'a str) -> Fut,
        Fut: Future<Output = Result<Vec<(String, Value)>, AdapterError>>,
    {
        trace!("Running ToolRunner::for_each_host()");
        let scans: Vec<_> = hosts
            .iter()
            .map(|host| {
                let scan_future = scan_one(host.as_str());
                async move { (host.as_str(), scan_future.await) }
            })
            .collect();
        let mut results: Vec<(&str, Result<Vec<(String, Value)>, AdapterError>)> =
            stream::iter(scans)
                .buffer_unordered(self.workers)
                .collect()
                .await;
        results.sort_by(|a, b| a.0.cmp(b.0));

        let mut finding = ScanFinding::new();
        for (host, result) in results {
            match result {
                Ok(entries) => {
                    for (key, payload) in entries {
                        finding.append(&key, payload);
                    }
                }
                Err(e) => {
                    error!("Scan of {} failed: {}", host, e);
                    finding.record_error(&format!("{}: {}", host, e));
                }
            }
        }
        finding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    #[tokio::test]
    async fn missing_binary_is_a_tool_error() {
        let runner = ToolRunner::new(
            "/nonexistent/cvescout-test-binary",
            1,
            Duration::from_secs(5),
        );
        let result = runner.run(&["-h".to_string()]).await;
        assert!(matches!(result, Err(AdapterError::Tool { .. })));
    }

    #[tokio::test]
    async fn for_each_host_keeps_successes_next_to_errors() {
        let runner = ToolRunner::new("unused", 2, Duration::from_secs(5));
        let hosts = vec![
            "192.0.2.1".to_string(),
            "192.0.2.2".to_string(),
            "192.0.2.3".to_string(),
        ];
        let finding = runner
            .for_each_host(&hosts, |host| async move {
                if host == "192.0.2.2" {
                    Err(AdapterError::Timeout(Duration::from_secs(1)))
                } else {
                    Ok(vec![(host.to_string(), json!({"ok": true}))])
                }
            })
            .await;

        assert_eq!(finding.get("192.0.2.1"), Some(&json!({"ok": true})));
        assert_eq!(finding.get("192.0.2.3"), Some(&json!({"ok": true})));
        assert_eq!(finding.error(), Some("192.0.2.2: timed out after 1s"));
    }

    #[tokio::test]
    async fn for_each_host_appends_matches_under_the_same_key() {
        let runner = ToolRunner::new("unused", 2, Duration::from_secs(5));
        let hosts = vec!["192.0.2.1".to_string(), "192.0.2.1:8443".to_string()];
        let finding = runner
            .for_each_host(&hosts, |host| async move {
                Ok(vec![(
                    "http://192.0.2.1".to_string(),
                    json!([{"matched-at": host}]),
                )])
            })
            .await;

        assert_eq!(
            finding.get("http://192.0.2.1"),
            Some(&json!([{"matched-at": "192.0.2.1"}, {"matched-at": "192.0.2.1:8443"}]))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn expired_processes_are_killed() {
        let runner = ToolRunner::new("sh", 1, Duration::from_millis(200));
        let started = Instant::now();
        let result = runner
            .run(&["-c".to_string(), "sleep 5".to_string()])
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(AdapterError::Timeout(t)) if t == Duration::from_millis(200)));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runners_sharing_permits_share_the_limit() {
        let permits = Arc::new(Semaphore::new(1));
        let first = ToolRunner::with_permits("sh", permits.clone(), 1, Duration::from_secs(10));
        let second = ToolRunner::with_permits("sh", permits, 1, Duration::from_secs(10));
        let args = vec!["-c".to_string(), "sleep 0.3".to_string()];

        let started = Instant::now();
        let (a, b, c) = tokio::join!(first.run(&args), second.run(&args), first.run(&args));
        let elapsed = started.elapsed();

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        // Three processes of 0.3s, one at a time
        assert!(elapsed >= Duration::from_millis(900), "elapsed {:?}", elapsed);
    }

    #[test]
    fn from_config_creates_selected_scanners() {
        let config = ScanConfig {
            scanners: vec![Scanners::Nmap, Scanners::Nuclei],
            workers: 2,
            timeout: Duration::from_secs(60),
            nuclei_path: "nuclei".to_string(),
            nmap_path: "nmap".to_string(),
        };
        let names: Vec<&str> = from_config(&config).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["nmap", "nuclei"]);
    }
}
