// src/core/probes/intel_probe.rs

use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::models::{ProbeResult, Target};
use crate::core::net::NetContext;
use crate::core::probes::{Probe, to_data};

pub const NAME: &str = "threat_intel";

const SHODAN_HOST_API: &str = "https://api.shodan.io/shodan/host";

pub const VULN_WEIGHT: u32 = 5;
pub const VULN_SCORE_CAP: u32 = 25;
pub const RISKY_PORT_WEIGHT: u32 = 5;
pub const LOOKUP_FAILURE_PENALTY: u32 = 10;

/// Services that should rarely face the internet on a site's web host.
pub const RISKY_PORTS: &[(u16, &str)] = &[
    (21, "ftp"),
    (23, "telnet"),
    (445, "smb"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgres"),
    (5900, "vnc"),
    (6379, "redis"),
    (9200, "elasticsearch"),
    (11211, "memcached"),
    (27017, "mongodb"),
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShodanHost {
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub vulns: Vec<String>,
    pub org: Option<String>,
    pub isp: Option<String>,
    pub os: Option<String>,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default)]
    pub data: Vec<ShodanService>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShodanService {
    pub port: u16,
    pub transport: Option<String>,
    pub product: Option<String>,
}

#[derive(Serialize)]
struct IntelData {
    ip: String,
    ports: Vec<u16>,
    vulns: Vec<String>,
    services: Vec<ShodanService>,
    org: Option<String>,
    isp: Option<String>,
    os: Option<String>,
    hostnames: Vec<String>,
}

enum HostLookup {
    Found(ShodanHost),
    Unknown,
}

/// Exposure data for the target's address from the Shodan host API.
pub struct IntelProbe {
    net: NetContext,
    api_key: Option<String>,
}

impl IntelProbe {
    pub fn new(net: NetContext, api_key: Option<String>) -> Self {
        Self { net, api_key }
    }

    async fn fetch_host(&self, ip: IpAddr, key: &str) -> Result<HostLookup, String> {
        debug!(%ip, "Querying Shodan host API.");
        let response = self
            .net
            .http
            .get(format!("{SHODAN_HOST_API}/{ip}"))
            .query(&[("key", key)])
            .send()
            .await
            // The request URL carries the key; keep it out of messages.
            .map_err(|e| e.without_url().to_string())?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(HostLookup::Unknown);
        }
        let response = response.error_for_status().map_err(|e| e.without_url().to_string())?;
        let host = response.json::<ShodanHost>().await.map_err(|e| e.without_url().to_string())?;
        Ok(HostLookup::Found(host))
    }
}

#[async_trait]
impl Probe for IntelProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, target: &Target) -> ProbeResult {
        let Some(key) = self.api_key.as_deref() else {
            info!("No Shodan API key configured, skipping threat intelligence.");
            return ProbeResult::failure(NAME, "Threat intelligence unavailable: no Shodan API key configured", 0);
        };
        info!(target = %target.domain(), "Starting threat intelligence lookup.");

        let ip = match self.net.resolve_ip(target).await {
            Ok(ip) => ip,
            Err(e) => return lookup_failure(&e),
        };

        match self.fetch_host(ip, key).await {
            Ok(HostLookup::Found(host)) => {
                let result = assess_host(ip, host);
                info!(%ip, findings = result.warnings.len(), score = result.score_contribution, "Threat intelligence lookup finished.");
                result
            }
            Ok(HostLookup::Unknown) => {
                info!(%ip, "Host unknown to Shodan.");
                assess_host(ip, ShodanHost::default())
            }
            Err(e) => lookup_failure(&e),
        }
    }
}

fn lookup_failure(error: &str) -> ProbeResult {
    warn!(error, "Threat intelligence lookup failed.");
    ProbeResult::failure(NAME, format!("Threat intelligence lookup failed: {}", error), LOOKUP_FAILURE_PENALTY)
}

/// Known vulnerabilities first, then exposed risky services by port.
pub fn assess_host(ip: IpAddr, host: ShodanHost) -> ProbeResult {
    let mut result = ProbeResult::new(NAME);

    let mut vuln_score = 0u32;
    for vuln in &host.vulns {
        result.warnings.push(format!("Known vulnerability: {}", vuln));
        vuln_score = vuln_score.saturating_add(VULN_WEIGHT);
    }
    result.score_contribution = vuln_score.min(VULN_SCORE_CAP);

    let mut ports = host.ports.clone();
    ports.sort_unstable();
    ports.dedup();
    for port in &ports {
        if let Some((_, service)) = RISKY_PORTS.iter().find(|(p, _)| p == port) {
            result.flag(format!("Exposed {} service on port {}", service, port), RISKY_PORT_WEIGHT);
        }
    }

    result.with_data(to_data(&IntelData {
        ip: ip.to_string(),
        ports,
        vulns: host.vulns,
        services: host.data,
        org: host.org,
        isp: host.isp,
        os: host.os,
        hostnames: host.hostnames,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

    #[test]
    fn clean_host_scores_zero() {
        let host = ShodanHost { ports: vec![443, 80], ..ShodanHost::default() };
        let result = assess_host(IP, host);
        assert!(result.warnings.is_empty());
        assert_eq!(result.score_contribution, 0);
        assert_eq!(result.data["ports"], serde_json::json!([80, 443]));
        assert_eq!(result.data["ip"], "203.0.113.7");
    }

    #[test]
    fn vulnerability_score_is_capped() {
        let host = ShodanHost {
            vulns: (0..8).map(|i| format!("CVE-2024-000{i}")).collect(),
            ..ShodanHost::default()
        };
        let result = assess_host(IP, host);
        assert_eq!(result.warnings.len(), 8);
        assert_eq!(result.score_contribution, VULN_SCORE_CAP);
    }

    #[test]
    fn risky_ports_add_on_top_of_vulns() {
        let host: ShodanHost = serde_json::from_str(
            r#"{
                "ports": [22, 3389, 6379, 6379, 443],
                "vulns": ["CVE-2019-0708"],
                "org": "Bulletproof Hosting",
                "data": [{"port": 3389, "transport": "tcp", "product": "Remote Desktop Protocol"}]
            }"#,
        )
        .unwrap();
        let result = assess_host(IP, host);
        assert_eq!(
            result.warnings,
            vec![
                "Known vulnerability: CVE-2019-0708",
                "Exposed rdp service on port 3389",
                "Exposed redis service on port 6379",
            ]
        );
        assert_eq!(result.score_contribution, VULN_WEIGHT + 2 * RISKY_PORT_WEIGHT);
        assert_eq!(result.data["services"][0]["product"], "Remote Desktop Protocol");
        assert_eq!(result.data["org"], "Bulletproof Hosting");
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_penalty() {
        let net = NetContext::new(&crate::config::Config::default()).unwrap();
        let probe = IntelProbe::new(net, None);
        let result = probe.run(&Target::parse("https://example.com").unwrap()).await;
        assert!(result.failed);
        assert_eq!(result.score_contribution, 0);
        assert_eq!(result.warnings, vec!["Threat intelligence unavailable: no Shodan API key configured"]);
    }

    #[test]
    fn lookup_failure_is_penalized() {
        let result = lookup_failure("HTTP status client error (401 Unauthorized)");
        assert!(result.failed);
        assert_eq!(result.score_contribution, LOOKUP_FAILURE_PENALTY);
    }
}
