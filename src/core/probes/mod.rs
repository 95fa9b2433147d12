// src/core/probes/mod.rs

// The fixed probe set. Each probe gathers one category of signal about a
// target and reports it through the shared `ProbeResult` envelope.
pub mod browser_probe;
pub mod certificate;
pub mod dns_probe;
pub mod domain_probe;
pub mod intel_probe;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::Config;
use crate::core::browser::ChromiumEngine;
use crate::core::models::{LookupResult, ProbeResult, Target};
use crate::core::net::NetContext;
use crate::core::orchestrator::Orchestrator;

use self::browser_probe::BrowserProbe;
use self::dns_probe::DnsProbe;
use self::domain_probe::DomainProbe;
use self::intel_probe::IntelProbe;

/// One independent inspection of a target.
///
/// `run` must always hand back a result: failures a probe can anticipate are
/// reported through `failed` and `warnings`. Anything else (a panic, a hang)
/// is dealt with by the orchestrator.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Stable identifier, used as the report section key.
    fn name(&self) -> &'static str;

    async fn run(&self, target: &Target) -> ProbeResult;
}

/// Builds the orchestrator with the full probe set, in report order.
pub fn build_orchestrator(config: &Config, net: NetContext) -> Orchestrator {
    let t = &config.timeouts;
    let engine = Arc::new(ChromiumEngine::new(config.chrome_path.clone()));

    Orchestrator::new(t.request_deadline, config.score_cap)
        .register(Arc::new(DnsProbe::new(net.clone(), config.geoip_url.clone())), t.dns)
        .register(Arc::new(DomainProbe::new(net.clone(), t.http)), t.domain)
        .register(
            Arc::new(BrowserProbe::new(engine, config.screenshot_dir.clone(), t.navigation)),
            t.browser,
        )
        .register(Arc::new(IntelProbe::new(net, config.shodan_api_key.clone())), t.intel)
}

/// Renders a sub-lookup as its value, or as `{ "error": .. }` when it failed.
pub(crate) fn lookup_section<T: Serialize>(result: &LookupResult<T>) -> Value {
    match result {
        Ok(value) => serde_json::to_value(value).unwrap_or_default(),
        Err(e) => json!({ "error": e }),
    }
}

/// Serializes a probe's own data schema into the opaque `data` payload.
pub(crate) fn to_data<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or_default()
}
