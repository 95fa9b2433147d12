// src/core/whois.rs

//! Minimal WHOIS (RFC 3912) client: one query to the root server, one
//! optional referral hop, then a best-effort field extraction.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

static RE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*([A-Za-z][A-Za-z0-9 /_.-]*?)\s*:\s*(.*?)\s*$").unwrap());
static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

const REGISTRAR_KEYS: &[&str] = &["registrar", "sponsoring registrar", "registrar name"];
const CREATED_KEYS: &[&str] = &[
    "creation date",
    "created",
    "created on",
    "registered on",
    "registration time",
    "domain registration date",
    "registered",
];
const EXPIRES_KEYS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
    "expiry date",
    "expires",
    "expires on",
    "paid-till",
];
const REGISTRANT_KEYS: &[&str] = &["registrant name", "registrant organization", "registrant"];
const NAME_SERVER_KEYS: &[&str] = &["name server", "nameserver", "nserver", "name servers"];
const STATUS_KEYS: &[&str] = &["domain status", "status", "state"];
const REFERRAL_KEYS: &[&str] = &["refer", "whois"];
const NOT_FOUND_MARKERS: &[&str] = &["no match for", "not found", "no data found", "no entries found", "returned 0 objects"];

#[derive(Debug, Error)]
pub enum WhoisError {
    #[error("could not reach WHOIS server {server}: {source}")]
    Connect { server: String, source: io::Error },
    #[error("WHOIS exchange with {server} failed: {source}")]
    Io { server: String, source: io::Error },
    #[error("WHOIS server {0} did not answer in time")]
    Timeout(String),
    #[error("no WHOIS record for {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WhoisRecord {
    pub registrar: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub registrant: Option<String>,
    pub name_servers: Vec<String>,
    pub status: Vec<String>,
    pub emails: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WhoisClient {
    root_server: String,
    timeout: Duration,
}

impl WhoisClient {
    pub fn new(root_server: &str, timeout: Duration) -> Self {
        Self { root_server: root_server.to_string(), timeout }
    }

    pub async fn lookup(&self, domain: &str) -> Result<WhoisRecord, WhoisError> {
        let query = registrable_domain(domain);
        debug!(domain = %query, server = %self.root_server, "Querying WHOIS.");
        let root_answer = self.query(&self.root_server, &query).await?;

        let text = match referral(&root_answer) {
            Some(server) if !server.eq_ignore_ascii_case(&self.root_server) => {
                // The root answer describes the TLD, not the domain, so a
                // failed referral is a failed lookup.
                debug!(domain = %query, %server, "Following WHOIS referral.");
                self.query(&server, &query).await.inspect_err(|e| {
                    warn!(domain = %query, error = %e, "WHOIS referral failed.");
                })?
            }
            _ => root_answer,
        };

        if is_not_found(&text) {
            return Err(WhoisError::NotFound(query));
        }
        Ok(parse_record(&text))
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, WhoisError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, WHOIS_PORT))
                .await
                .map_err(|source| WhoisError::Connect { server: server.to_string(), source })?;
            let io_err = |source| WhoisError::Io { server: server.to_string(), source };
            stream.write_all(format!("{query}\r\n").as_bytes()).await.map_err(io_err)?;
            let mut buf = Vec::new();
            (&mut stream).take(MAX_RESPONSE_BYTES).read_to_end(&mut buf).await.map_err(io_err)?;
            Ok::<_, WhoisError>(String::from_utf8_lossy(&buf).into_owned())
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| WhoisError::Timeout(server.to_string()))?
    }
}

/// Registries only know registered names, so `www.` and other leading
/// labels are dropped down to one label under the public suffix
/// (`abc.de`, `example.co.uk`).
fn registrable_domain(domain: &str) -> String {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.parse::<std::net::IpAddr>().is_ok() {
        return domain;
    }
    match psl::domain_str(&domain) {
        Some(registrable) => registrable.to_string(),
        None => domain.strip_prefix("www.").unwrap_or(&domain).to_string(),
    }
}

fn fields(text: &str) -> impl Iterator<Item = (String, &str)> {
    RE_FIELD.captures_iter(text).filter_map(|caps| {
        let key = caps.get(1)?.as_str().trim().to_ascii_lowercase();
        let value = caps.get(2)?.as_str().trim();
        (!value.is_empty()).then_some((key, value))
    })
}

fn referral(text: &str) -> Option<String> {
    fields(text)
        .find(|(key, _)| REFERRAL_KEYS.contains(&key.as_str()))
        .map(|(_, value)| value.to_string())
}

fn is_not_found(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    text.trim().is_empty() || NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn parse_record(text: &str) -> WhoisRecord {
    let mut record = WhoisRecord::default();

    for (key, value) in fields(text) {
        let key = key.as_str();
        if REGISTRAR_KEYS.contains(&key) && record.registrar.is_none() {
            record.registrar = Some(value.to_string());
        } else if CREATED_KEYS.contains(&key) && record.creation_date.is_none() {
            record.creation_date = parse_whois_date(value);
        } else if EXPIRES_KEYS.contains(&key) && record.expiration_date.is_none() {
            record.expiration_date = parse_whois_date(value);
        } else if REGISTRANT_KEYS.contains(&key) && record.registrant.is_none() {
            record.registrant = Some(value.to_string());
        } else if NAME_SERVER_KEYS.contains(&key) {
            let ns = value.split_whitespace().next().unwrap_or(value).to_ascii_lowercase();
            if !record.name_servers.contains(&ns) {
                record.name_servers.push(ns);
            }
        } else if STATUS_KEYS.contains(&key) {
            let status = value.split_whitespace().next().unwrap_or(value).to_string();
            if !record.status.contains(&status) {
                record.status.push(status);
            }
        }
    }

    for m in RE_EMAIL.find_iter(text) {
        let email = m.as_str().to_ascii_lowercase();
        if !record.emails.contains(&email) {
            record.emails.push(email);
        }
    }
    record
}

/// Parses the date formats registries actually use.
pub fn parse_whois_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim().trim_end_matches("(UTC)").trim_end_matches("UTC").trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y.%m.%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }
    let date_part = trimmed.split_whitespace().next()?;
    for fmt in ["%Y-%m-%d", "%d-%b-%Y", "%Y.%m.%d", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}
