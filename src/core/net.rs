// src/core/net.rs

use std::net::IpAddr;
use std::sync::Arc;

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use reqwest::redirect::Policy;
use tracing::debug;

use crate::config::Config;
use crate::core::models::{LookupResult, Target};
use crate::core::whois::WhoisClient;

pub const USER_AGENT: &str = concat!("PhishGuard/", env!("CARGO_PKG_VERSION"));

/// Network handles shared by every probe of every request.
///
/// Created once at startup and passed in explicitly; probes never build
/// their own resolver or HTTP client.
#[derive(Clone)]
pub struct NetContext {
    pub resolver: Arc<TokioAsyncResolver>,
    /// Does not follow redirects on its own, so callers can count hops.
    pub http: reqwest::Client,
    pub whois: WhoisClient,
}

impl NetContext {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mut opts = ResolverOpts::default();
        opts.timeout = config.timeouts.http;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .timeout(config.timeouts.http)
            .build()?;

        Ok(Self {
            resolver: Arc::new(resolver),
            http,
            whois: WhoisClient::new(&config.whois_server, config.timeouts.http),
        })
    }

    /// First address the target's host resolves to (or the literal itself).
    pub async fn resolve_ip(&self, target: &Target) -> LookupResult<IpAddr> {
        if let Some(ip) = target.ip_literal() {
            return Ok(ip);
        }
        debug!(host = target.domain(), "Resolving host address.");
        let lookup = self
            .resolver
            .lookup_ip(target.domain())
            .await
            .map_err(|e| format!("DNS Error: {}", e))?;
        lookup
            .iter()
            .next()
            .ok_or_else(|| format!("No address found for {}", target.domain()))
    }
}
