// src/core/browser.rs

//! Headless browser session used by the browser probe.
//!
//! The probe only sees [`BrowserEngine`]; [`ChromiumEngine`] drives a real
//! Chromium over CDP through `chromiumoxide`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Installed before any page script runs; collects what the page reports
/// through `console.error` and uncaught errors.
const CONSOLE_HOOK: &str = r#"
(() => {
  const sink = [];
  Object.defineProperty(window, '__phishguardConsole', { value: sink });
  const push = (m) => { try { sink.push(String(m)); } catch (_) {} };
  const original = console.error;
  console.error = function (...args) {
    push(args.map(String).join(' '));
    return original.apply(console, args);
  };
  window.addEventListener('error', (e) => push(e.message));
  window.addEventListener('unhandledrejection', (e) => push(e.reason));
})();
"#;

const COLLECT_CONSOLE: &str = "Array.from(window.__phishguardConsole || [])";

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("navigation timed out after {}s", .0.as_secs())]
    NavigationTimeout(Duration),
    #[error("{0}")]
    Session(String),
}

impl From<CdpError> for BrowserError {
    fn from(err: CdpError) -> Self {
        BrowserError::Session(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    pub screenshot_path: PathBuf,
    pub navigation_timeout: Duration,
}

/// A network request the page made while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRequest {
    pub url: String,
    /// Lowercase CDP resource type (`document`, `script`, `image`, ...).
    pub resource_type: String,
}

/// What one page load produced.
#[derive(Debug, Clone, Default)]
pub struct PageCapture {
    /// Top-level document URLs in navigation order, redirects included.
    pub redirect_chain: Vec<String>,
    pub final_url: String,
    /// Main document response headers, names lowercased.
    pub headers: BTreeMap<String, String>,
    pub html: String,
    pub requests: Vec<ObservedRequest>,
    pub console_errors: Vec<String>,
    /// `None` when the screenshot could not be written.
    pub screenshot_path: Option<PathBuf>,
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Loads the page in a fresh, isolated session.
    async fn capture(&self, request: &CaptureRequest) -> Result<PageCapture, BrowserError>;
}

pub struct ChromiumEngine {
    executable: Option<PathBuf>,
}

impl ChromiumEngine {
    /// Uses the given Chrome/Chromium binary, or auto-detects one.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn browser_config(&self, profile: &std::path::Path, request: &CaptureRequest) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile)
            .window_size(1920, 1080)
            .viewport(Viewport { width: 1920, height: 1080, ..Viewport::default() })
            .request_timeout(request.navigation_timeout);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BrowserError::Session)
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn capture(&self, request: &CaptureRequest) -> Result<PageCapture, BrowserError> {
        // Throwaway profile: no cookies or cache leak between requests.
        let profile = tempfile::Builder::new()
            .prefix("phishguard-profile-")
            .tempdir()
            .map_err(|e| BrowserError::Session(format!("could not create browser profile: {}", e)))?;

        let config = self.browser_config(profile.path(), request)?;
        debug!(url = %request.url, "Launching headless browser.");
        let (mut browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let outcome = load_page(&browser, request).await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser did not close cleanly.");
        }
        let _ = browser.wait().await;
        handler_task.abort();
        outcome
    }
}

async fn load_page(browser: &Browser, request: &CaptureRequest) -> Result<PageCapture, BrowserError> {
    let page = browser.new_page("about:blank").await?;
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(CONSOLE_HOOK)).await?;

    let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut responses = page.event_listener::<EventResponseReceived>().await?;

    info!(url = %request.url, "Navigating headless browser.");
    match tokio::time::timeout(request.navigation_timeout, page.goto(request.url.as_str())).await {
        Err(_) | Ok(Err(CdpError::Timeout)) => {
            return Err(BrowserError::NavigationTimeout(request.navigation_timeout));
        }
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => {}
    }

    let final_url = page.url().await?.unwrap_or_else(|| request.url.clone());
    let html = page.content().await?;
    let console_errors: Vec<String> = page
        .evaluate(COLLECT_CONSOLE)
        .await?
        .into_value()
        .map_err(|e| BrowserError::Session(format!("could not read console messages: {}", e)))?;

    let screenshot_path = match page
        .save_screenshot(ScreenshotParams::builder().full_page(true).build(), &request.screenshot_path)
        .await
    {
        Ok(_) => Some(request.screenshot_path.clone()),
        Err(e) => {
            warn!(path = %request.screenshot_path.display(), error = %e, "Screenshot failed.");
            None
        }
    };

    let main_frame = page.mainframe().await?;

    // Navigation has finished, so everything the load produced is buffered.
    let mut capture = PageCapture {
        final_url,
        html,
        console_errors,
        screenshot_path,
        ..PageCapture::default()
    };
    while let Some(Some(event)) = requests.next().now_or_never() {
        let resource_type = event.r#type.as_ref().map(resource_type_name).unwrap_or_default();
        let top_level = main_frame.is_none() || event.frame_id == main_frame;
        if resource_type == "document" && top_level {
            capture.redirect_chain.push(event.request.url.clone());
        }
        capture.requests.push(ObservedRequest { url: event.request.url.clone(), resource_type });
    }
    while let Some(Some(event)) = responses.next().now_or_never() {
        // Later document responses in the main frame supersede redirects.
        let top_level = main_frame.is_none() || event.frame_id == main_frame;
        if matches!(event.r#type, ResourceType::Document) && top_level {
            capture.headers = header_map(event.response.headers.inner().clone());
        }
    }

    debug!(
        requests = capture.requests.len(),
        console_errors = capture.console_errors.len(),
        "Page capture finished."
    );
    Ok(capture)
}

fn resource_type_name(resource_type: &ResourceType) -> String {
    serde_json::to_value(resource_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "other".to_string())
}

/// Flattens the CDP header object; names are lowercased.
pub fn header_map(headers: Value) -> BTreeMap<String, String> {
    let Value::Object(map) = headers else {
        return BTreeMap::new();
    };
    map.into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name.to_ascii_lowercase(), value)
        })
        .collect()
}
