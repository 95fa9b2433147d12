// src/config.rs

//! Runtime configuration, read from the environment (and `.env` if present).

use color_eyre::eyre::{Result, WrapErr, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::logging::get_data_dir;

pub const ENV_PREFIX: &str = "PHISHGUARD_";

#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub request_deadline: Duration,
    pub dns: Duration,
    pub domain: Duration,
    pub browser: Duration,
    pub intel: Duration,
    /// Hard limit for the headless browser's page load.
    pub navigation: Duration,
    /// Per-request limit for plain HTTP and WHOIS exchanges.
    pub http: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(60),
            dns: Duration::from_secs(20),
            domain: Duration::from_secs(30),
            browser: Duration::from_secs(50),
            intel: Duration::from_secs(20),
            navigation: Duration::from_secs(30),
            http: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub score_cap: u32,
    pub timeouts: Timeouts,
    pub screenshot_dir: PathBuf,
    pub shodan_api_key: Option<String>,
    pub whois_server: String,
    /// Geolocation endpoint; `{ip}` is replaced with the address.
    pub geoip_url: String,
    pub chrome_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            score_cap: 100,
            timeouts: Timeouts::default(),
            screenshot_dir: get_data_dir().join("screenshots"),
            shodan_api_key: None,
            whois_server: "whois.iana.org".to_string(),
            geoip_url: "http://ip-api.com/json/{ip}".to_string(),
            chrome_path: None,
        }
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset or blank
    /// keys fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        let t = &defaults.timeouts;

        let config = Self {
            score_cap: parse_or(&get, "SCORE_CAP", defaults.score_cap)?,
            timeouts: Timeouts {
                request_deadline: secs_or(&get, "REQUEST_DEADLINE_SECS", t.request_deadline)?,
                dns: secs_or(&get, "DNS_TIMEOUT_SECS", t.dns)?,
                domain: secs_or(&get, "DOMAIN_TIMEOUT_SECS", t.domain)?,
                browser: secs_or(&get, "BROWSER_TIMEOUT_SECS", t.browser)?,
                intel: secs_or(&get, "INTEL_TIMEOUT_SECS", t.intel)?,
                navigation: secs_or(&get, "NAVIGATION_TIMEOUT_SECS", t.navigation)?,
                http: secs_or(&get, "HTTP_TIMEOUT_SECS", t.http)?,
            },
            screenshot_dir: get(&format!("{ENV_PREFIX}SCREENSHOT_DIR"))
                .map(PathBuf::from)
                .unwrap_or(defaults.screenshot_dir),
            shodan_api_key: get("SHODAN_API_KEY"),
            whois_server: get(&format!("{ENV_PREFIX}WHOIS_SERVER")).unwrap_or(defaults.whois_server),
            geoip_url: get(&format!("{ENV_PREFIX}GEOIP_URL")).unwrap_or(defaults.geoip_url),
            chrome_path: get(&format!("{ENV_PREFIX}CHROME_PATH")).map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.score_cap == 0 {
            bail!("{}SCORE_CAP must be greater than zero", ENV_PREFIX);
        }
        let t = &self.timeouts;
        for (name, value) in [
            ("REQUEST_DEADLINE_SECS", t.request_deadline),
            ("DNS_TIMEOUT_SECS", t.dns),
            ("DOMAIN_TIMEOUT_SECS", t.domain),
            ("BROWSER_TIMEOUT_SECS", t.browser),
            ("INTEL_TIMEOUT_SECS", t.intel),
            ("NAVIGATION_TIMEOUT_SECS", t.navigation),
            ("HTTP_TIMEOUT_SECS", t.http),
        ] {
            if value.is_zero() {
                bail!("{}{} must be greater than zero", ENV_PREFIX, name);
            }
        }
        if t.navigation >= t.browser {
            bail!(
                "{}NAVIGATION_TIMEOUT_SECS ({}) must be lower than {}BROWSER_TIMEOUT_SECS ({})",
                ENV_PREFIX,
                t.navigation.as_secs(),
                ENV_PREFIX,
                t.browser.as_secs()
            );
        }
        if !self.geoip_url.contains("{ip}") {
            bail!("{}GEOIP_URL must contain an {{ip}} placeholder", ENV_PREFIX);
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    let full_key = format!("{ENV_PREFIX}{key}");
    match get(&full_key) {
        Some(raw) => raw.parse().wrap_err_with(|| format!("Invalid {full_key}: '{raw}'")),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.shodan_api_key.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PHISHGUARD_SCORE_CAP", "80"),
            ("PHISHGUARD_DNS_TIMEOUT_SECS", "7"),
            ("PHISHGUARD_SCREENSHOT_DIR", "/tmp/shots"),
            ("SHODAN_API_KEY", "abc123"),
            ("PHISHGUARD_CHROME_PATH", "  "),
        ]))
        .unwrap();
        assert_eq!(config.score_cap, 80);
        assert_eq!(config.timeouts.dns, Duration::from_secs(7));
        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.shodan_api_key.as_deref(), Some("abc123"));
        assert_eq!(config.chrome_path, None);
    }

    #[test]
    fn rejects_unparsable_and_inconsistent_values() {
        assert!(Config::from_lookup(lookup(&[("PHISHGUARD_SCORE_CAP", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PHISHGUARD_SCORE_CAP", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PHISHGUARD_HTTP_TIMEOUT_SECS", "0")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[
                ("PHISHGUARD_NAVIGATION_TIMEOUT_SECS", "60"),
                ("PHISHGUARD_BROWSER_TIMEOUT_SECS", "45"),
            ]))
            .is_err()
        );
        assert!(Config::from_lookup(lookup(&[("PHISHGUARD_GEOIP_URL", "http://geo.local/")])).is_err());
    }
}
