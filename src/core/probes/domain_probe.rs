// src/core/probes/domain_probe.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::LOCATION;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::core::models::{LookupResult, ProbeResult, RiskLevel, Target};
use crate::core::net::NetContext;
use crate::core::probes::certificate::{CertificateInfo, fetch_certificate};
use crate::core::probes::{Probe, lookup_section, to_data};
use crate::core::whois::WhoisRecord;

pub const NAME: &str = "domain";

pub const NEW_DOMAIN_DAYS: i64 = 30;
pub const NEW_DOMAIN_WEIGHT: u32 = 20;
pub const WHOIS_FAILURE_WEIGHT: u32 = 10;
pub const SSL_FAILURE_WEIGHT: u32 = 30;
pub const SUSPICIOUS_TLD_WEIGHT: u32 = 15;
pub const BAD_STATUS_WEIGHT: u32 = 10;
pub const REDIRECTS_WEIGHT: u32 = 15;
pub const UNREACHABLE_WEIGHT: u32 = 25;

/// More hops than this count as a redirect chain worth reporting.
pub const REDIRECT_THRESHOLD: usize = 2;
const MAX_REDIRECTS: usize = 10;

pub const SUSPICIOUS_TLDS: &[&str] = &["xyz", "top", "work", "loan", "click", "tk", "ml", "ga", "cf", "gq"];

static RE_TLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[a-z]{2,63}|xn--[a-z0-9-]{2,59})$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reachability {
    pub status: u16,
    pub redirects: usize,
    pub final_url: String,
}

#[derive(Debug, Clone, Serialize)]
struct DomainInfo {
    registrar: Option<String>,
    creation_date: Option<DateTime<Utc>>,
    expiration_date: Option<DateTime<Utc>>,
    registered_to: Option<String>,
}

#[derive(Serialize)]
struct DomainData {
    is_valid_url: bool,
    domain_age: Option<i64>,
    domain_info: Option<DomainInfo>,
    ssl_valid: bool,
    ssl_info: Option<CertificateInfo>,
    suspicious_tld: bool,
    tld: Option<String>,
    reachability: serde_json::Value,
    risk_score: u32,
    risk_level: RiskLevel,
}

/// Everything the domain probe gathers from the network before scoring.
#[derive(Debug, Clone)]
pub struct DomainSignals {
    pub whois: LookupResult<WhoisRecord>,
    pub certificate: LookupResult<CertificateInfo>,
    pub reachability: LookupResult<Reachability>,
}

/// Registration age, certificate, TLD reputation and reachability.
pub struct DomainProbe {
    net: NetContext,
    connect_timeout: Duration,
}

impl DomainProbe {
    pub fn new(net: NetContext, connect_timeout: Duration) -> Self {
        Self { net, connect_timeout }
    }

    /// HEAD request that follows redirects by hand so the hop count is known.
    async fn check_reachability(&self, url: &str) -> LookupResult<Reachability> {
        let mut current = Url::parse(url).map_err(|e| e.to_string())?;
        let mut redirects = 0;

        loop {
            let response = self.net.http.head(current.clone()).send().await.map_err(|e| e.to_string())?;
            let status = response.status();
            let location = response.headers().get(LOCATION).and_then(|v| v.to_str().ok());

            match location {
                Some(location) if status.is_redirection() => {
                    if redirects >= MAX_REDIRECTS {
                        return Err(format!("Exceeded {} redirects", MAX_REDIRECTS));
                    }
                    current = current.join(location).map_err(|e| format!("Bad redirect target: {}", e))?;
                    redirects += 1;
                    debug!(hop = redirects, url = %current, "Following redirect.");
                }
                _ => {
                    return Ok(Reachability { status: status.as_u16(), redirects, final_url: current.to_string() });
                }
            }
        }
    }
}

#[async_trait]
impl Probe for DomainProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, target: &Target) -> ProbeResult {
        let host = target.domain();
        info!(target = %host, "Starting domain inspection.");

        if !is_well_formed_url(target.url()) {
            warn!(url = target.url(), "URL failed strict well-formedness check.");
            return invalid_url_result();
        }

        let (whois, certificate, reachability) = tokio::join!(
            self.net.whois.lookup(host),
            fetch_certificate(host, self.connect_timeout),
            self.check_reachability(target.url()),
        );
        let signals = DomainSignals {
            whois: whois.map_err(|e| e.to_string()),
            certificate,
            reachability,
        };

        let result = assess(host, &signals, Utc::now());
        info!(findings = result.warnings.len(), score = result.score_contribution, "Domain inspection finished.");
        result
    }
}

fn invalid_url_result() -> ProbeResult {
    let mut result = ProbeResult::new(NAME);
    result.warnings.push("Invalid URL format".to_string());
    result.with_data(to_data(&DomainData {
        is_valid_url: false,
        domain_age: None,
        domain_info: None,
        ssl_valid: false,
        ssl_info: None,
        suspicious_tld: false,
        tld: None,
        reachability: serde_json::Value::Null,
        risk_score: 0,
        risk_level: RiskLevel::Low,
    }))
}

/// Scores the gathered signals. Checks run in a fixed order so warnings
/// come out in the same order every time.
pub fn assess(host: &str, signals: &DomainSignals, now: DateTime<Utc>) -> ProbeResult {
    let mut result = ProbeResult::new(NAME);

    let mut domain_age = None;
    let mut domain_info = None;
    match &signals.whois {
        Ok(record) => {
            if let Some(created) = record.creation_date {
                let age = now.signed_duration_since(created).num_days();
                domain_age = Some(age);
                if age < NEW_DOMAIN_DAYS {
                    result.flag("Domain is very new", NEW_DOMAIN_WEIGHT);
                }
            }
            domain_info = Some(DomainInfo {
                registrar: record.registrar.clone(),
                creation_date: record.creation_date,
                expiration_date: record.expiration_date,
                registered_to: record.registrant.clone(),
            });
        }
        Err(e) => result.flag(format!("Could not verify domain age: {}", e), WHOIS_FAILURE_WEIGHT),
    }

    let ssl_info = match &signals.certificate {
        Ok(cert) => Some(cert.clone()),
        Err(e) => {
            debug!(error = %e, "Certificate check failed.");
            result.flag("Invalid or missing SSL certificate", SSL_FAILURE_WEIGHT);
            None
        }
    };

    let tld = top_level_label(host);
    let suspicious_tld = tld.as_deref().is_some_and(|t| SUSPICIOUS_TLDS.contains(&t));
    if suspicious_tld {
        result.flag(format!("Suspicious TLD: .{}", tld.as_deref().unwrap_or_default()), SUSPICIOUS_TLD_WEIGHT);
    }

    match &signals.reachability {
        Ok(reach) => {
            if reach.status != 200 {
                result.flag(format!("Website returned status code: {}", reach.status), BAD_STATUS_WEIGHT);
            }
            if reach.redirects > REDIRECT_THRESHOLD {
                result.flag(format!("Multiple redirects detected: {}", reach.redirects), REDIRECTS_WEIGHT);
            }
        }
        Err(e) => result.flag(format!("Could not access website: {}", e), UNREACHABLE_WEIGHT),
    }

    let risk_score = result.score_contribution;
    let data = DomainData {
        is_valid_url: true,
        domain_age,
        domain_info,
        ssl_valid: ssl_info.is_some(),
        ssl_info,
        suspicious_tld,
        tld,
        reachability: lookup_section(&signals.reachability),
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
    };
    result.with_data(to_data(&data))
}

/// Last DNS label, lowercased. IP literals have none.
fn top_level_label(host: &str) -> Option<String> {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }
    host.rsplit('.').next().filter(|l| !l.is_empty()).map(str::to_ascii_lowercase)
}

/// Stricter than target validation: http(s) only, no whitespace, no
/// userinfo, and a dotted host ending in an alphabetic label (or IPv4).
pub fn is_well_formed_url(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") || !url.username().is_empty() || url.password().is_some() {
        return false;
    }
    match url.host() {
        Some(Host::Ipv4(ip)) => ip != Ipv4Addr::UNSPECIFIED,
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            domain.contains('.') && domain.rsplit('.').next().is_some_and(|tld| RE_TLD.is_match(tld))
        }
        _ => false,
    }
}
