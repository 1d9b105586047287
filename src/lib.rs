//! cvescout pulls the latest CVEs from public feeds, looks for hosts that may
//! be affected with internet search engines, optionally scans them, and
//! writes one report per CVE.

pub mod aggregator;
pub mod application;
pub mod config;
pub mod engines;
pub mod error;
pub mod feeds;
pub mod http;
pub mod models;
pub mod scanners;
pub mod summarizers;
pub mod writers;
pub mod writeups;
