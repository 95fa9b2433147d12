// src/core/probes/dns_probe.rs

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::models::{LookupResult, ProbeResult, Target};
use crate::core::net::NetContext;
use crate::core::probes::{Probe, lookup_section, to_data};

pub const NAME: &str = "dns";

pub const NO_A_WEIGHT: u32 = 10;
pub const NO_MX_WEIGHT: u32 = 5;
pub const NO_NS_WEIGHT: u32 = 10;
pub const NO_SPF_WEIGHT: u32 = 5;
pub const NO_DMARC_WEIGHT: u32 = 5;

/// Records gathered for the post-lookup analysis. Every list is empty when
/// its lookup failed; a missing record type is not an error here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DnsRecords {
    pub a_records: Vec<String>,
    pub aaaa_records: Vec<String>,
    pub mx_records: Vec<String>,
    pub ns_records: Vec<String>,
    pub txt_records: Vec<String>,
    pub dmarc_records: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnsAnalysis {
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip)]
    pub score: u32,
}

impl DnsAnalysis {
    fn flag(&mut self, warning: &str, recommendation: Option<&str>, weight: u32) {
        self.warnings.push(warning.to_string());
        if let Some(r) = recommendation {
            self.recommendations.push(r.to_string());
        }
        self.score += weight;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReverseDns {
    pub ip: String,
    pub hostname: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

/// Wire shape of the geolocation service (ip-api.com compatible).
#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
}

#[derive(Serialize)]
struct DnsData {
    domain: String,
    #[serde(flatten)]
    records: DnsRecords,
    whois_info: Value,
    reverse_dns: Value,
    geo_location: Value,
    analysis: DnsAnalysis,
}

/// DNS footprint and registration metadata of the target's domain.
pub struct DnsProbe {
    net: NetContext,
    geoip_url: String,
}

impl DnsProbe {
    pub fn new(net: NetContext, geoip_url: String) -> Self {
        Self { net, geoip_url }
    }

    async fn reverse_dns(&self, target: &Target) -> LookupResult<ReverseDns> {
        let ip = self.net.resolve_ip(target).await?;
        let lookup = self
            .net
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(|e| format!("Reverse DNS lookup failed: {}", e))?;
        let mut names = lookup.iter().map(|ptr| ptr.to_string());
        let hostname = names.next().ok_or_else(|| format!("No PTR record for {}", ip))?;
        Ok(ReverseDns { ip: ip.to_string(), hostname, aliases: names.collect() })
    }

    async fn geo_location(&self, target: &Target) -> LookupResult<GeoLocation> {
        let ip = self.net.resolve_ip(target).await?;
        let url = self.geoip_url.replace("{ip}", &ip.to_string());
        debug!(%ip, "Looking up geolocation.");
        let response: GeoResponse = self
            .net
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("Geolocation lookup failed: {}", e))?
            .json()
            .await
            .map_err(|e| format!("Geolocation lookup failed: {}", e))?;
        geo_from_response(response)
    }
}

fn geo_from_response(response: GeoResponse) -> LookupResult<GeoLocation> {
    if response.status.as_deref() == Some("fail") {
        return Err(format!(
            "Geolocation lookup failed: {}",
            response.message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    Ok(GeoLocation {
        country: response.country,
        city: response.city,
        latitude: response.lat,
        longitude: response.lon,
        timezone: response.timezone,
    })
}

#[async_trait]
impl Probe for DnsProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, target: &Target) -> ProbeResult {
        let host = target.domain();
        // Mail and zone records live on the registered name, not on `www.`.
        let root = host.strip_prefix("www.").unwrap_or(host);
        info!(target = %host, "Starting DNS inspection.");

        let dmarc_name = format!("_dmarc.{root}");
        let resolver = self.net.resolver.as_ref();
        let (a, aaaa, mx, ns, txt, dmarc, whois, reverse, geo) = tokio::join!(
            lookup_a(resolver, host),
            lookup_aaaa(resolver, host),
            lookup_mx(resolver, root),
            lookup_ns(resolver, root),
            lookup_txt(resolver, root),
            lookup_txt(resolver, &dmarc_name),
            self.net.whois.lookup(host),
            self.reverse_dns(target),
            self.geo_location(target),
        );

        let records = DnsRecords {
            a_records: a,
            aaaa_records: aaaa,
            mx_records: mx,
            ns_records: ns,
            txt_records: txt,
            dmarc_records: dmarc,
        };
        let analysis = analyze_records(&records);
        let whois = whois.map_err(|e| format!("WHOIS lookup failed: {}", e));

        if let Err(e) = &whois {
            warn!(target = %host, error = %e, "WHOIS section unavailable.");
        }

        let mut result = ProbeResult::new(NAME);
        result.warnings = analysis.warnings.clone();
        result.score_contribution = analysis.score;
        info!(findings = analysis.warnings.len(), score = analysis.score, "DNS inspection finished.");

        result.with_data(to_data(&DnsData {
            domain: host.to_string(),
            records,
            whois_info: lookup_section(&whois),
            reverse_dns: lookup_section(&reverse),
            geo_location: lookup_section(&geo),
            analysis,
        }))
    }
}

/// Flags missing address, mail, nameserver and e-mail authentication records.
pub fn analyze_records(records: &DnsRecords) -> DnsAnalysis {
    let mut analysis = DnsAnalysis::default();

    if records.a_records.is_empty() {
        analysis.flag("No IPv4 addresses found", None, NO_A_WEIGHT);
    }
    if records.mx_records.is_empty() {
        analysis.flag(
            "No mail servers configured",
            Some("Configure MX records if email is needed"),
            NO_MX_WEIGHT,
        );
    }
    if records.ns_records.is_empty() {
        analysis.flag("No nameservers found", Some("Configure proper nameservers"), NO_NS_WEIGHT);
    }

    let txt = || records.txt_records.iter().chain(records.dmarc_records.iter());
    let has_spf = txt().any(|r| r.to_ascii_lowercase().contains("v=spf1"));
    let has_dmarc = txt().any(|r| r.to_ascii_lowercase().contains("v=dmarc1"));

    if !has_spf {
        analysis.flag(
            "No SPF record found",
            Some("Add SPF record to prevent email spoofing"),
            NO_SPF_WEIGHT,
        );
    }
    if !has_dmarc {
        analysis.flag(
            "No DMARC record found",
            Some("Add DMARC record to enhance email security"),
            NO_DMARC_WEIGHT,
        );
    }
    analysis
}

fn absorb<T>(kind: &str, name: &str, result: Result<Vec<String>, T>) -> Vec<String>
where
    T: std::fmt::Display,
{
    match result {
        Ok(records) => {
            debug!(kind, name, count = records.len(), "Records found.");
            records
        }
        Err(e) => {
            debug!(kind, name, error = %e, "Lookup returned nothing.");
            Vec::new()
        }
    }
}

async fn lookup_a(resolver: &TokioAsyncResolver, name: &str) -> Vec<String> {
    let result = resolver.ipv4_lookup(name).await.map(|l| l.iter().map(|r| r.to_string()).collect());
    absorb("A", name, result)
}

// IPv6 absence is normal and never flagged.
async fn lookup_aaaa(resolver: &TokioAsyncResolver, name: &str) -> Vec<String> {
    let result = resolver.ipv6_lookup(name).await.map(|l| l.iter().map(|r| r.to_string()).collect());
    absorb("AAAA", name, result)
}

async fn lookup_mx(resolver: &TokioAsyncResolver, name: &str) -> Vec<String> {
    let result = resolver
        .mx_lookup(name)
        .await
        .map(|l| l.iter().map(|mx| mx.exchange().to_string()).collect());
    absorb("MX", name, result)
}

async fn lookup_ns(resolver: &TokioAsyncResolver, name: &str) -> Vec<String> {
    let result = resolver.ns_lookup(name).await.map(|l| l.iter().map(|r| r.to_string()).collect());
    absorb("NS", name, result)
}

async fn lookup_txt(resolver: &TokioAsyncResolver, name: &str) -> Vec<String> {
    let result = resolver.txt_lookup(name).await.map(|l| l.iter().map(|r| r.to_string()).collect());
    absorb("TXT", name, result)
}
