//! The nmap scanner.
//! nmap is run with the `vuln` scripts and prints XML. Only the open ports
//! and the script outputs are kept.

use async_trait::async_trait;
use log::{trace, warn};
use regex::Regex;
use serde_json::{json, Value};

use super::{ActiveScanAdapter, ToolRunner};
use crate::error::AdapterError;
use crate::models::ScanFinding;

/// The name of the scanner.
pub const NAME: &str = "nmap";

/// Runs nmap against each host.
pub struct NmapScanner {
    runner: ToolRunner,
    /// Matches an open port element.
    port_regex: Regex,
    /// Matches a script element.
    script_regex: Regex,
}

impl NmapScanner {
    /// Creates a new NmapScanner.
    /// The regexes are compiled once and the scanner can be reused.
    pub fn new(runner: ToolRunner) -> Self {
        // Example: <port protocol="tcp" portid="443"><state state="open" reason="syn-ack"
        let port_regex = Regex::new(
            r#"<port protocol="(?P<protocol>[a-z]+)" portid="(?P<port>\d+)"><state state="open""#,
        )
        .unwrap();
        // Example: <script id="http-csrf" output="Couldn&apos;t find any CSRF"/>
        let script_regex =
            Regex::new(r#"<script id="(?P<id>[^"]+)" output="(?P<output>[^"]*)""#).unwrap();
        Self {
            runner,
            port_regex,
            script_regex,
        }
    }

    /// The arguments for one host.
    pub fn arguments(host: &str) -> Vec<String> {
        vec![
            "-sV".to_string(),
            "--script".to_string(),
            "vuln".to_string(),
            "-oX".to_string(),
            "-".to_string(),
            host.to_string(),
        ]
    }

    /// Parses the XML output, line by line.
    /// Lines that are not recognized are ignored.
    pub fn parse_xml(&self, output: &str) -> Value {
        trace!("Running NmapScanner::parse_xml()");
        let mut open_ports = Vec::new();
        let mut scripts = Vec::new();
        for line in output.lines() {
            if let Some(caps) = self.port_regex.captures(line) {
                open_ports.push(format!("{}/{}", &caps["port"], &caps["protocol"]));
            }
            for caps in self.script_regex.captures_iter(line) {
                scripts.push(json!({
                    "id": &caps["id"],
                    "output": unescape_xml(&caps["output"]),
                }));
            }
        }
        if open_ports.is_empty() && scripts.is_empty() && !output.contains("<nmaprun") {
            warn!("The nmap output doesn't look like XML");
        }
        json!({"open_ports": open_ports, "scripts": scripts})
    }

    /// Scans one host.
    async fn scan_host(&self, host: &str) -> Result<Vec<(String, Value)>, AdapterError> {
        let stdout = self.runner.run(&Self::arguments(host)).await?;
        Ok(vec![(host.to_string(), self.parse_xml(&stdout))])
    }
}

#[async_trait]
impl ActiveScanAdapter for NmapScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    /// The vuln scripts are generic, the vulnerability is not used.
    async fn scan(&self, hosts: &[String], _vulnerability_ref: Option<&str>) -> ScanFinding {
        trace!("Running NmapScanner::scan()");
        self.runner
            .for_each_host(hosts, |host| self.scan_host(host))
            .await
    }
}

/// Replaces the XML entities nmap uses in attributes.
fn unescape_xml(value: &str) -> String {
    value
        .replace("&#xa;", "\n")
        .replace("&#xd;", "")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const OUTPUT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sV --script vuln -oX - 192.0.2.1">
<host><address addr="192.0.2.1" addrtype="ipv4"/>
<ports><port protocol="tcp" portid="22"><state state="closed" reason="reset"/></port>
<port protocol="tcp" portid="80"><state state="open" reason="syn-ack" reason_ttl="0"/><service name="http" product="Apache httpd"/>
<script id="http-csrf" output="&#xa;Couldn&apos;t find any CSRF vulnerabilities."/></port>
<port protocol="tcp" portid="443"><state state="open" reason="syn-ack"/><script id="ssl-heartbleed" output="VULNERABLE: &lt;heartbleed&gt;"/>
</port></ports></host></nmaprun>
"#;

    fn scanner() -> NmapScanner {
        NmapScanner::new(ToolRunner::new("nmap", 1, Duration::from_secs(1)))
    }

    #[test]
    fn parse_xml_extracts_ports_and_scripts() {
        let parsed = scanner().parse_xml(OUTPUT);
        assert_eq!(parsed["open_ports"], json!(["80/tcp", "443/tcp"]));
        assert_eq!(
            parsed["scripts"],
            json!([
                {"id": "http-csrf", "output": "\nCouldn't find any CSRF vulnerabilities."},
                {"id": "ssl-heartbleed", "output": "VULNERABLE: <heartbleed>"}
            ])
        );
    }

    #[test]
    fn parse_xml_on_garbage() {
        let parsed = scanner().parse_xml("Starting Nmap\nsegfault");
        assert_eq!(parsed, json!({"open_ports": [], "scripts": []}));
    }
}
