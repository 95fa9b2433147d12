// src/core/probes/browser_probe.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::core::browser::{BrowserEngine, BrowserError, CaptureRequest, PageCapture};
use crate::core::models::{ProbeResult, RiskLevel, Target};
use crate::core::probes::{Probe, to_data};

pub const NAME: &str = "browser";

pub const SECURITY_HEADERS: &[&str] = &[
    "Content-Security-Policy",
    "X-Frame-Options",
    "X-Content-Type-Options",
    "X-XSS-Protection",
    "Strict-Transport-Security",
    "Referrer-Policy",
];

pub const MISSING_HEADER_WEIGHT: u32 = 5;
pub const EXTERNAL_FORM_WEIGHT: u32 = 15;
pub const EXTERNAL_RESOURCE_THRESHOLD: usize = 20;
pub const EXTERNAL_RESOURCES_WEIGHT: u32 = 10;
pub const CONSOLE_ERROR_WEIGHT: u32 = 2;
pub const NAVIGATION_TIMEOUT_PENALTY: u32 = 30;
pub const SESSION_ERROR_PENALTY: u32 = 100;

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").unwrap());
static FIELD_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("input, select, textarea, button").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormInfo {
    /// Absolute submission target, as the browser would resolve it.
    pub action: String,
    pub method: String,
    pub inputs: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalResource {
    pub domain: String,
    pub resource_types: Vec<String>,
}

#[derive(Serialize)]
struct BrowserData {
    redirects: Vec<String>,
    final_url: String,
    security_headers: BTreeMap<String, String>,
    forms_found: Vec<FormInfo>,
    external_resources: Vec<ExternalResource>,
    javascript_errors: Vec<String>,
    screenshot_path: Option<String>,
    risk_score: u32,
    risk_level: RiskLevel,
}

impl BrowserData {
    fn empty(url: &str) -> Self {
        Self {
            redirects: Vec::new(),
            final_url: url.to_string(),
            security_headers: BTreeMap::new(),
            forms_found: Vec::new(),
            external_resources: Vec::new(),
            javascript_errors: Vec::new(),
            screenshot_path: None,
            risk_score: 0,
            risk_level: RiskLevel::Low,
        }
    }
}

/// Renders the page in a headless browser and inspects what it does.
pub struct BrowserProbe {
    engine: Arc<dyn BrowserEngine>,
    screenshot_dir: PathBuf,
    navigation_timeout: Duration,
}

impl BrowserProbe {
    pub fn new(engine: Arc<dyn BrowserEngine>, screenshot_dir: PathBuf, navigation_timeout: Duration) -> Self {
        Self { engine, screenshot_dir, navigation_timeout }
    }
}

#[async_trait]
impl Probe for BrowserProbe {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn run(&self, target: &Target) -> ProbeResult {
        info!(target = %target.url(), "Starting browser inspection.");
        let request = CaptureRequest {
            url: target.url().to_string(),
            screenshot_path: screenshot_path(&self.screenshot_dir, target.domain()),
            navigation_timeout: self.navigation_timeout,
        };

        let result = match self.engine.capture(&request).await {
            Ok(capture) => assess(&capture),
            Err(err) => session_failure(target.url(), &err),
        };
        info!(findings = result.warnings.len(), score = result.score_contribution, "Browser inspection finished.");
        result
    }
}

/// One file per host. Concurrent requests for the same host share it.
pub fn screenshot_path(dir: &Path, host: &str) -> PathBuf {
    let safe: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!("{safe}.png"))
}

fn session_failure(url: &str, err: &BrowserError) -> ProbeResult {
    let (warning, penalty) = match err {
        BrowserError::NavigationTimeout(_) => {
            warn!(url, error = %err, "Page load timed out.");
            ("Page load timeout - site might be slow or unresponsive".to_string(), NAVIGATION_TIMEOUT_PENALTY)
        }
        BrowserError::Session(_) => {
            error!(url, error = %err, "Browser session failed.");
            (format!("Browser check error: {}", err), SESSION_ERROR_PENALTY)
        }
    };
    let data = BrowserData {
        risk_score: penalty,
        risk_level: RiskLevel::High,
        ..BrowserData::empty(url)
    };
    ProbeResult::failure(NAME, warning, penalty).with_data(to_data(&data))
}

/// Scores one page capture: missing security headers, forms posting to other
/// hosts, third-party resource volume and script errors.
pub fn assess(capture: &PageCapture) -> ProbeResult {
    let mut result = ProbeResult::new(NAME);
    let page_url = Url::parse(&capture.final_url).ok();
    let page_host = page_url.as_ref().and_then(|u| u.host_str()).map(str::to_ascii_lowercase);

    let mut security_headers = BTreeMap::new();
    for header in SECURITY_HEADERS {
        match capture.headers.get(&header.to_ascii_lowercase()) {
            Some(value) => {
                security_headers.insert(header.to_string(), value.clone());
            }
            None => result.flag(format!("Missing security header: {}", header), MISSING_HEADER_WEIGHT),
        }
    }

    let forms = extract_forms(&capture.html, page_url.as_ref());
    for form in &forms {
        let action_host = Url::parse(&form.action)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
        if action_host != page_host {
            debug!(action = %form.action, "Form submits off-site.");
            result.flag(format!("Form submitting to external domain: {}", form.action), EXTERNAL_FORM_WEIGHT);
        }
    }

    let external_resources = group_external_resources(capture, page_host.as_deref());
    if external_resources.len() > EXTERNAL_RESOURCE_THRESHOLD {
        result.flag(
            format!("High number of external resources: {}", external_resources.len()),
            EXTERNAL_RESOURCES_WEIGHT,
        );
    }

    let js_errors = capture.console_errors.len();
    if js_errors > 0 {
        let weight = u32::try_from(js_errors).unwrap_or(u32::MAX).saturating_mul(CONSOLE_ERROR_WEIGHT);
        result.flag(format!("JavaScript errors detected: {}", js_errors), weight);
    }

    let risk_score = result.score_contribution;
    let data = BrowserData {
        redirects: capture.redirect_chain.clone(),
        final_url: capture.final_url.clone(),
        security_headers,
        forms_found: forms,
        external_resources,
        javascript_errors: capture.console_errors.clone(),
        screenshot_path: capture.screenshot_path.as_ref().map(|p| p.display().to_string()),
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
    };
    result.with_data(to_data(&data))
}

/// Forms in document order. A missing or empty `action` submits to the page
/// itself; relative actions are resolved against the page URL.
pub fn extract_forms(html: &str, page_url: Option<&Url>) -> Vec<FormInfo> {
    let document = Html::parse_document(html);
    document
        .select(&FORM_SELECTOR)
        .map(|form| {
            let raw_action = form.value().attr("action").map(str::trim).unwrap_or_default();
            let action = match page_url {
                Some(base) if raw_action.is_empty() => base.to_string(),
                Some(base) => base.join(raw_action).map(|u| u.to_string()).unwrap_or_else(|_| raw_action.to_string()),
                None => raw_action.to_string(),
            };
            let method = form
                .value()
                .attr("method")
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "get".to_string());
            let inputs = form.select(&FIELD_SELECTOR).map(field_of).collect();
            FormInfo { action, method, inputs }
        })
        .collect()
}

fn field_of(element: ElementRef<'_>) -> FormField {
    let el = element.value();
    let declared = el.attr("type").map(str::to_ascii_lowercase);
    let kind = match el.name() {
        "select" if el.attr("multiple").is_some() => "select-multiple".to_string(),
        "select" => "select-one".to_string(),
        "textarea" => "textarea".to_string(),
        "button" => declared.unwrap_or_else(|| "submit".to_string()),
        _ => declared.unwrap_or_else(|| "text".to_string()),
    };
    FormField {
        kind,
        name: el.attr("name").unwrap_or_default().to_string(),
        id: el.attr("id").unwrap_or_default().to_string(),
    }
}

/// Distinct third-party hosts contacted while loading, with the resource
/// types fetched from each.
fn group_external_resources(capture: &PageCapture, page_host: Option<&str>) -> Vec<ExternalResource> {
    let mut by_domain: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for request in &capture.requests {
        let Some(host) = Url::parse(&request.url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) else {
            continue;
        };
        if Some(host.as_str()) == page_host {
            continue;
        }
        by_domain.entry(host).or_default().insert(request.resource_type.clone());
    }
    by_domain
        .into_iter()
        .map(|(domain, types)| ExternalResource { domain, resource_types: types.into_iter().collect() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::browser::ObservedRequest;
    use pretty_assertions::assert_eq;

    struct FakeEngine {
        outcome: Result<PageCapture, BrowserError>,
    }

    #[async_trait]
    impl BrowserEngine for FakeEngine {
        async fn capture(&self, _request: &CaptureRequest) -> Result<PageCapture, BrowserError> {
            match &self.outcome {
                Ok(capture) => Ok(capture.clone()),
                Err(BrowserError::NavigationTimeout(d)) => Err(BrowserError::NavigationTimeout(*d)),
                Err(BrowserError::Session(m)) => Err(BrowserError::Session(m.clone())),
            }
        }
    }

    fn all_headers() -> BTreeMap<String, String> {
        SECURITY_HEADERS
            .iter()
            .map(|h| (h.to_ascii_lowercase(), "set".to_string()))
            .collect()
    }

    fn capture(html: &str) -> PageCapture {
        PageCapture {
            redirect_chain: vec!["http://shop.example/".into(), "https://shop.example/".into()],
            final_url: "https://shop.example/".into(),
            headers: all_headers(),
            html: html.to_string(),
            ..PageCapture::default()
        }
    }

    fn probe(outcome: Result<PageCapture, BrowserError>) -> BrowserProbe {
        BrowserProbe::new(Arc::new(FakeEngine { outcome }), PathBuf::from("/tmp/shots"), Duration::from_secs(30))
    }

    #[test]
    fn six_missing_headers_cost_thirty() {
        let page = PageCapture { headers: BTreeMap::new(), ..capture("<html></html>") };
        let result = assess(&page);
        assert_eq!(result.warnings.len(), 6);
        assert_eq!(result.warnings[0], "Missing security header: Content-Security-Policy");
        assert_eq!(result.score_contribution, 30);
        assert_eq!(result.data["risk_level"], "Medium");
    }

    #[test]
    fn present_headers_are_reported_with_values() {
        let result = assess(&capture("<html></html>"));
        assert!(result.warnings.is_empty());
        assert_eq!(result.data["security_headers"]["X-Frame-Options"], "set");
        assert_eq!(result.data["redirects"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn only_cross_domain_forms_are_flagged() {
        let html = r#"
            <form action="/login" method="POST">
              <input name="user" id="u"><input type="password" name="pass">
              <button>Go</button>
            </form>
            <form action="https://collect.evil.example/p.php">
              <select name="bank"></select><textarea name="note"></textarea>
            </form>
            <form></form>
        "#;
        let result = assess(&capture(html));
        assert_eq!(
            result.warnings,
            vec!["Form submitting to external domain: https://collect.evil.example/p.php"]
        );
        assert_eq!(result.score_contribution, EXTERNAL_FORM_WEIGHT);

        let forms = &result.data["forms_found"];
        assert_eq!(forms[0]["action"], "https://shop.example/login");
        assert_eq!(forms[0]["method"], "post");
        assert_eq!(forms[0]["inputs"][0]["type"], "text");
        assert_eq!(forms[0]["inputs"][0]["id"], "u");
        assert_eq!(forms[0]["inputs"][1]["type"], "password");
        assert_eq!(forms[0]["inputs"][2]["type"], "submit");
        assert_eq!(forms[1]["method"], "get");
        assert_eq!(forms[1]["inputs"][0]["type"], "select-one");
        assert_eq!(forms[2]["action"], "https://shop.example/");
    }

    #[test]
    fn external_resources_are_grouped_by_domain() {
        let mut page = capture("<html></html>");
        page.requests = vec![
            ObservedRequest { url: "https://shop.example/app.js".into(), resource_type: "script".into() },
            ObservedRequest { url: "https://cdn.example.net/a.js".into(), resource_type: "script".into() },
            ObservedRequest { url: "https://cdn.example.net/b.png".into(), resource_type: "image".into() },
            ObservedRequest { url: "data:image/png;base64,AAAA".into(), resource_type: "image".into() },
        ];
        let result = assess(&page);
        assert!(result.warnings.is_empty());
        assert_eq!(result.data["external_resources"][0]["domain"], "cdn.example.net");
        assert_eq!(result.data["external_resources"][0]["resource_types"], serde_json::json!(["image", "script"]));

        page.requests = (0..=EXTERNAL_RESOURCE_THRESHOLD)
            .map(|i| ObservedRequest { url: format!("https://t{i}.tracker.example/x"), resource_type: "xhr".into() })
            .collect();
        let result = assess(&page);
        assert_eq!(result.warnings, vec!["High number of external resources: 21"]);
        assert_eq!(result.score_contribution, EXTERNAL_RESOURCES_WEIGHT);
    }

    #[test]
    fn console_errors_scale_the_penalty() {
        let page = PageCapture {
            console_errors: vec!["ReferenceError: a".into(), "TypeError: b".into(), "boom".into()],
            ..capture("<html></html>")
        };
        let result = assess(&page);
        assert_eq!(result.warnings, vec!["JavaScript errors detected: 3"]);
        assert_eq!(result.score_contribution, 3 * CONSOLE_ERROR_WEIGHT);
    }

    #[tokio::test]
    async fn navigation_timeout_is_a_high_risk_failure() {
        let target = Target::parse("https://slow.example/").unwrap();
        let result = probe(Err(BrowserError::NavigationTimeout(Duration::from_secs(30)))).run(&target).await;
        assert!(result.failed);
        assert_eq!(result.score_contribution, NAVIGATION_TIMEOUT_PENALTY);
        assert_eq!(result.warnings, vec!["Page load timeout - site might be slow or unresponsive"]);
        assert_eq!(result.data["risk_level"], "High");
    }

    #[tokio::test]
    async fn session_error_gets_maximal_penalty() {
        let target = Target::parse("https://shop.example/").unwrap();
        let result = probe(Err(BrowserError::Session("Chrome not found".into()))).run(&target).await;
        assert!(result.failed);
        assert_eq!(result.score_contribution, SESSION_ERROR_PENALTY);
        assert_eq!(result.warnings, vec!["Browser check error: Chrome not found"]);
        assert_eq!(result.data["risk_level"], "High");
    }

    #[tokio::test]
    async fn successful_capture_runs_the_assessment() {
        let target = Target::parse("https://shop.example/").unwrap();
        let result = probe(Ok(capture("<html></html>"))).run(&target).await;
        assert!(!result.failed);
        assert_eq!(result.score_contribution, 0);
        assert_eq!(result.data["final_url"], "https://shop.example/");
    }

    #[test]
    fn screenshot_names_are_keyed_by_host() {
        let dir = Path::new("/data/screenshots");
        assert_eq!(screenshot_path(dir, "login.example.com"), dir.join("login.example.com.png"));
        assert_eq!(screenshot_path(dir, "::1"), dir.join("__1.png"));
    }
}
