// src/core/models.rs

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use strum::{Display, EnumString};
use url::{Host, Url};

use crate::core::error::ValidationError;

// --- Reusable Result Types ---

/// Outcome of a single sub-lookup inside a probe. Errors are kept as text
/// because they only ever end up in a report field or a log line.
pub type LookupResult<T> = Result<T, String>;

// --- Target ---

/// A validated URL and the host it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    url: String,
    domain: String,
}

impl Target {
    /// Validates raw user input. Only `http` and `https` URLs with a
    /// syntactically valid host are accepted.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingUrl);
        }

        let parsed = Url::parse(trimmed).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }

        let domain = match parsed.host() {
            None => return Err(ValidationError::MissingHost),
            Some(Host::Domain(d)) => {
                let d = d.trim_end_matches('.').to_ascii_lowercase();
                if !is_valid_domain(&d) {
                    return Err(ValidationError::InvalidDomain(d));
                }
                d
            }
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
        };

        Ok(Self { url: trimmed.to_string(), domain })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The host as an IP address, when the URL used an IP literal.
    pub fn ip_literal(&self) -> Option<IpAddr> {
        self.domain.parse().ok()
    }
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

// --- Risk banding ---

pub const LOW_UPPER_BOUND: u32 = 20;
pub const MEDIUM_UPPER_BOUND: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// The one place score thresholds live. Probe-local bands use it too.
    pub fn from_score(score: u32) -> Self {
        if score < LOW_UPPER_BOUND {
            RiskLevel::Low
        } else if score < MEDIUM_UPPER_BOUND {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

// --- Probe envelope ---

/// The uniform output of one probe.
///
/// `data` is owned by the probe and opaque to everyone else; the remaining
/// fields are what the aggregator works with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub data: Value,
    pub warnings: Vec<String>,
    pub score_contribution: u32,
    pub failed: bool,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl ProbeResult {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Value::Null,
            warnings: Vec::new(),
            score_contribution: 0,
            failed: false,
            duration: Duration::ZERO,
        }
    }

    /// A failed result carrying one explanatory warning.
    pub fn failure(name: &str, warning: impl Into<String>, penalty: u32) -> Self {
        let mut result = Self::new(name);
        result.failed = true;
        result.flag(warning, penalty);
        result
    }

    /// Appends a warning and adds its weight to the score contribution.
    pub fn flag(&mut self, warning: impl Into<String>, weight: u32) {
        self.warnings.push(warning.into());
        self.score_contribution = self.score_contribution.saturating_add(weight);
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

// --- Verdict & Report ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub total_score: u32,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
}

/// The externally returned analysis of one target. Built once by the
/// report assembler and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    target: Target,
    probes: Vec<ProbeResult>,
    verdict: Verdict,
}

impl Report {
    pub(crate) fn new(target: Target, probes: Vec<ProbeResult>, verdict: Verdict) -> Self {
        Self { target, probes, verdict }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Probe results in registration order.
    pub fn probes(&self) -> &[ProbeResult] {
        &self.probes
    }

    pub fn probe(&self, name: &str) -> Option<&ProbeResult> {
        self.probes.iter().find(|p| p.name == name)
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }
}

/// Serialized as `{ "target": .., <probe-name>: ProbeResult, .., "verdict": .. }`.
impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.probes.len() + 2))?;
        map.serialize_entry("target", &self.target)?;
        for probe in &self.probes {
            map.serialize_entry(&probe.name, probe)?;
        }
        map.serialize_entry("verdict", &self.verdict)?;
        map.end()
    }
}

/// The inbound request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_https_url_and_lowercases_domain() {
        let target = Target::parse("  https://Example.COM/login?x=1 ").unwrap();
        assert_eq!(target.domain(), "example.com");
        assert_eq!(target.url(), "https://Example.COM/login?x=1");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Target::parse(""), Err(ValidationError::MissingUrl));
        assert_eq!(Target::parse("   "), Err(ValidationError::MissingUrl));
        assert!(matches!(Target::parse("not a url"), Err(ValidationError::Malformed(_))));
        assert!(matches!(
            Target::parse("ftp://example.com"),
            Err(ValidationError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            Target::parse("http://bad_host.example"),
            Err(ValidationError::InvalidDomain(_)) | Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn accepts_ip_literals() {
        let target = Target::parse("http://93.184.216.34/").unwrap();
        assert_eq!(target.domain(), "93.184.216.34");
        assert!(target.ip_literal().is_some());
    }

    #[test]
    fn risk_band_boundaries() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(19), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(20), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(49), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(u32::MAX), RiskLevel::High);
    }

    #[test]
    fn failure_carries_a_warning_and_penalty() {
        let result = ProbeResult::failure("dns", "resolver exploded", 30);
        assert!(result.failed);
        assert_eq!(result.warnings, vec!["resolver exploded".to_string()]);
        assert_eq!(result.score_contribution, 30);
    }

    #[test]
    fn report_serializes_probe_sections_by_name() {
        let target = Target::parse("https://example.com").unwrap();
        let mut dns = ProbeResult::new("dns");
        dns.duration = Duration::from_millis(1500);
        let verdict = Verdict { total_score: 0, risk_level: RiskLevel::Low, warnings: vec![] };
        let report = Report::new(target, vec![dns], verdict);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dns"]["duration_ms"], 1500);
        assert_eq!(json["dns"]["failed"], false);
        assert_eq!(json["verdict"]["risk_level"], "Low");
        assert_eq!(json["target"]["domain"], "example.com");
    }
}
