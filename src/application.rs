//! This module contains the main structure and logic for the whole
//! application.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use log::{debug, error, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, QueryRules, Settings};
use crate::config::{non_empty, Config, EngineCredentials, ScanConfig, SummarizerConfig};
use crate::engines::Engines;
use crate::error::ConfigError;
use crate::feeds::nvd::{NvdFeed, DEFAULT_NVD_FEED_URL};
use crate::feeds::osv::{OsvFeed, DEFAULT_OSV_FEED_URL};
use crate::models::{CveReport, Scanners, Writers};
use crate::scanners;
use crate::summarizers::groq::{GroqSummarizer, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::summarizers::{DisabledSummarizer, Summarizer};
use crate::writeups::WriteupIndex;
use crate::writers::{self, Writer};

/// Represents the application
pub struct Application {
    /// The pipeline, with every adapter already created.
    aggregator: Aggregator,
    /// The writers selected by the user.
    writers: Vec<Box<dyn Writer>>,
    /// How many CVEs to process.
    limit: usize,
    /// The feed to try first, if any.
    preferred_source: Option<String>,
}

impl Application {
    /// Creates the application from a configuration.
    /// Every configuration problem is reported here, before any CVE is
    /// processed.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        trace!("Running Application::new()");
        config.validate()?;

        fs::create_dir_all(&config.output_dir).map_err(|source| ConfigError::OutputDir {
            path: config.output_dir.clone(),
            source,
        })?;

        let rules = match &config.query_rules {
            Some(path) => QueryRules::load(path)?,
            None => QueryRules::default(),
        };
        let writeups = match &config.writeups {
            Some(path) => WriteupIndex::load(path)?,
            None => WriteupIndex::default(),
        };
        debug!("{} query rules, {} writeups", rules.len(), writeups.len());

        let summarizer: Box<dyn Summarizer> = match &config.summarizer {
            Some(SummarizerConfig {
                api_key: Some(api_key),
                model,
                endpoint,
            }) => Box::new(GroqSummarizer::new(
                api_key,
                model,
                endpoint,
                config.http_timeout,
            )?),
            Some(SummarizerConfig { api_key: None, .. }) => {
                return Err(ConfigError::MissingSummarizerKey)
            }
            None => {
                info!("Summaries are disabled");
                Box::new(DisabledSummarizer)
            }
        };

        let mut aggregator = Aggregator::new(summarizer)
            .with_query_rules(rules)
            .with_writeups(writeups)
            .with_settings(Settings {
                window: config.window,
                engine_timeout: config.http_timeout,
                cve_workers: config.cve_workers,
            });

        // The order of the feeds is their priority order
        if let Some(url) = &config.nvd_feed_url {
            aggregator = aggregator.with_feed(Box::new(NvdFeed::new(url, config.http_timeout)?));
        }
        if let Some(url) = &config.osv_feed_url {
            aggregator = aggregator.with_feed(Box::new(OsvFeed::new(url, config.http_timeout)?));
        }

        aggregator = aggregator.with_engines(Engines::from_credentials(
            &config.credentials,
            config.http_timeout,
            config.max_hosts,
        )?);

        if let Some(scan) = &config.scan {
            info!("Active scans enabled with {:?}", scan.scanners);
            for scanner in scanners::from_config(scan) {
                aggregator = aggregator.with_scanner(scanner);
            }
        }

        Ok(Application {
            aggregator,
            writers: writers::from_kinds(&config.writers, &config.output_dir),
            limit: config.limit,
            preferred_source: config.preferred_source,
        })
    }

    /// The token cancelling the run.
    pub fn cancellation(&self) -> CancellationToken {
        self.aggregator.cancellation()
    }

    /// Hands a report to every writer. A failing writer doesn't prevent the
    /// others from writing.
    fn write_report(&self, report: &CveReport) {
        for writer in &self.writers {
            match writer.write(report) {
                Ok(Some(path)) => debug!("{} written to {}", report.cve_id, path.display()),
                Ok(None) => {}
                Err(e) => error!("Unable to write the report of {}: {}", report.cve_id, e),
            }
        }
    }

    /// Runs the pipeline until every selected CVE has a report.
    /// Returns the number of reports produced.
    pub async fn run_async(&self) -> usize {
        trace!("Running Application::run_async()");
        self.aggregator
            .run(self.limit, self.preferred_source.as_deref(), |report| {
                self.write_report(report)
            })
            .await
    }

    /// Runs the global application, stopping cleanly on Ctrl-C.
    pub fn run(&self) -> std::io::Result<usize> {
        trace!("Running Application::run()");
        let tk_runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let cancel = self.cancellation();
        tk_runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing the CVEs in progress");
                cancel.cancel();
            }
        });

        let produced = tk_runtime.block_on(self.run_async());
        info!("Run finished, {} reports written", produced);
        Ok(produced)
    }
}

/// Represents the CLI arguments accepted by cvescout
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// How many CVEs to process
    #[arg(short, long, env = "CVESCOUT_LIMIT", default_value_t = 10)]
    pub limit: usize,
    /// Only the CVEs published during the last DAYS days are fetched
    #[arg(short, long, env = "CVESCOUT_DAYS", default_value_t = 1)]
    pub days: u64,
    /// The feed to use (nvd or osv). All the feeds are merged if absent
    #[arg(short, long, env = "CVESCOUT_SOURCE", value_name = "FEED")]
    pub source: Option<String>,
    /// The NVD feed. An empty value disables it
    #[arg(long, env = "NVD_FEED_URL", default_value = DEFAULT_NVD_FEED_URL)]
    pub nvd_feed_url: String,
    /// The OSV batch query endpoint. An empty value disables it
    #[arg(long, env = "OSV_FEED_URL", default_value = DEFAULT_OSV_FEED_URL)]
    pub osv_feed_url: String,
    /// The directory where the reports are written
    #[arg(short, long, env = "CVESCOUT_OUTPUT_DIR", default_value = "reports")]
    pub output_dir: PathBuf,
    /// The writers to use
    #[arg(
        short,
        long,
        value_name = "WRITER",
        value_delimiter = ',',
        default_values = ["markdown", "json"]
    )]
    pub writer: Vec<Writers>,
    /// How many CVEs are processed at the same time
    #[arg(long, env = "CVESCOUT_CVE_WORKERS", default_value_t = 2)]
    pub cve_workers: usize,
    /// Runs the active scanners on the hosts found
    #[arg(long)]
    pub scan: bool,
    /// The scanners to use with --scan
    #[arg(long, value_delimiter = ',', default_values = ["nuclei"])]
    pub scanners: Vec<Scanners>,
    /// How many scanner processes may run at the same time
    #[arg(long, env = "CVESCOUT_SCAN_WORKERS", default_value_t = 4)]
    pub scan_workers: usize,
    /// The limit of one scanner process, in seconds
    #[arg(long, env = "CVESCOUT_SCAN_TIMEOUT", default_value_t = 600)]
    pub scan_timeout: u64,
    /// The limit of one HTTP call, in seconds
    #[arg(long, env = "CVESCOUT_HTTP_TIMEOUT", default_value_t = 20)]
    pub http_timeout: u64,
    #[arg(long, env = "NUCLEI_PATH", default_value = "nuclei")]
    pub nuclei_path: String,
    #[arg(long, env = "NMAP_PATH", default_value = "nmap")]
    pub nmap_path: String,
    /// The maximum number of hosts asked to each search engine
    #[arg(long, default_value_t = 10)]
    pub max_hosts: usize,
    /// A JSON file replacing the built-in query rules
    #[arg(long, env = "CVESCOUT_QUERY_RULES", value_name = "FILE")]
    pub query_rules: Option<PathBuf>,
    /// A JSON file of writeups to link to the CVEs
    #[arg(long, env = "CVESCOUT_WRITEUPS", value_name = "FILE")]
    pub writeups: Option<PathBuf>,
    /// Doesn't ask the language model for summaries
    #[arg(long)]
    pub no_summary: bool,
    /// The model used for the summaries
    #[arg(long, env = "GROQ_MODEL", default_value = DEFAULT_MODEL)]
    pub groq_model: String,
    /// The chat completion endpoint used for the summaries
    #[arg(long, env = "GROQ_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub groq_endpoint: String,
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,
    #[arg(long, env = "SHODAN_API_KEY", hide_env_values = true)]
    pub shodan_api_key: Option<String>,
    #[arg(long, env = "CENSYS_API_ID", hide_env_values = true)]
    pub censys_api_id: Option<String>,
    #[arg(long, env = "CENSYS_API_SECRET", hide_env_values = true)]
    pub censys_api_secret: Option<String>,
    #[arg(long, env = "FOFA_EMAIL", hide_env_values = true)]
    pub fofa_email: Option<String>,
    #[arg(long, env = "FOFA_KEY", hide_env_values = true)]
    pub fofa_key: Option<String>,
    /// More logs, repeat for even more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Converts the arguments to the configuration of the run.
    pub fn into_config(self) -> Config {
        trace!("Running Args::into_config()");
        let credentials = EngineCredentials::from_values(
            self.shodan_api_key,
            self.censys_api_id,
            self.censys_api_secret,
            self.fofa_email,
            self.fofa_key,
        );
        let summarizer = if self.no_summary {
            None
        } else {
            Some(SummarizerConfig {
                api_key: non_empty(self.groq_api_key),
                model: self.groq_model,
                endpoint: self.groq_endpoint,
            })
        };
        let scan = if self.scan {
            Some(ScanConfig {
                scanners: self.scanners,
                workers: self.scan_workers,
                timeout: Duration::from_secs(self.scan_timeout),
                nuclei_path: self.nuclei_path,
                nmap_path: self.nmap_path,
            })
        } else {
            None
        };

        Config {
            limit: self.limit,
            window: Duration::from_secs(self.days.saturating_mul(86_400)),
            preferred_source: non_empty(self.source).map(|s| s.to_lowercase()),
            nvd_feed_url: non_empty(Some(self.nvd_feed_url)),
            osv_feed_url: non_empty(Some(self.osv_feed_url)),
            output_dir: self.output_dir,
            writers: self.writer,
            cve_workers: self.cve_workers,
            http_timeout: Duration::from_secs(self.http_timeout),
            max_hosts: self.max_hosts,
            credentials,
            summarizer,
            scan,
            query_rules: self.query_rules,
            writeups: self.writeups,
        }
    }
}
