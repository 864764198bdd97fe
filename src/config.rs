//! Static configuration, read from `RELAY_*` environment variables with
//! hard-coded defaults. There is no config file; the deployment surface
//! is a container with env vars.

use crate::error::{RelayError, RelayResult};
use serde::Serialize;
use url::Url;

/// Default marketplace listing to scrape.
pub const DEFAULT_LISTING_URL: &str =
    "https://p2p.binance.com/trade/all-payments/USDT?fiat=VES";

/// Fixed literal identifying this system to the destination endpoint.
pub const SOURCE_ID: &str = "rate-relay";

/// User agent sent both by the browser and the lightweight HTTP client.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Selector chain for offer extraction. Ordered: first non-empty match wins.
#[derive(Debug, Clone, Serialize)]
pub struct Selectors {
    /// One element per listed offer.
    pub container: String,
    /// Price element strategies, tried in order within each container.
    pub price: Vec<String>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            container: ".bn-flex.flex-col.border-b.border-b-line.py-l".to_string(),
            price: vec![
                "[class*=\"headline5\"]".to_string(),
                "[class*=\"price\"]".to_string(),
            ],
        }
    }
}

/// Runtime configuration for the whole service.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Marketplace listing page (client-rendered SPA).
    pub listing_url: String,
    pub selectors: Selectors,
    /// Per-navigation timeout for the listing page.
    pub page_timeout_ms: u64,
    /// Fixed wait after load events, for client-side rendering to finish.
    pub settle_delay_ms: u64,
    /// Downstream endpoint receiving the representative price.
    pub destination_url: String,
    /// Timeout for the lightweight delivery attempt.
    pub delivery_timeout_ms: u64,
    /// Scheduler interval between cycles.
    pub update_interval_secs: u64,
    /// Delay before the first scheduled cycle after process start.
    pub warmup_delay_secs: u64,
    /// HTTP front door port.
    pub port: u16,
    /// Directory for per-endpoint cycle logs.
    pub log_dir: String,
    /// Optional Chromium executable override.
    pub chromium_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            selectors: Selectors::default(),
            page_timeout_ms: 30_000,
            settle_delay_ms: 2_000,
            destination_url: "http://localhost:8080/api/rates/update".to_string(),
            delivery_timeout_ms: 15_000,
            update_interval_secs: 300,
            warmup_delay_secs: 10,
            port: 3000,
            log_dir: "logs".to_string(),
            chromium_path: None,
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = read_env("RELAY_LISTING_URL") {
            cfg.listing_url = v;
        }
        if let Some(v) = read_env("RELAY_CONTAINER_SELECTOR") {
            cfg.selectors.container = v;
        }
        if let Some(v) = read_env("RELAY_PRICE_SELECTORS") {
            // Comma-separated strategy list, in priority order.
            cfg.selectors.price = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = read_env_parse("RELAY_PAGE_TIMEOUT_MS") {
            cfg.page_timeout_ms = v;
        }
        if let Some(v) = read_env_parse("RELAY_SETTLE_DELAY_MS") {
            cfg.settle_delay_ms = v;
        }
        if let Some(v) = read_env("RELAY_DESTINATION_URL") {
            cfg.destination_url = v;
        }
        if let Some(v) = read_env_parse("RELAY_DELIVERY_TIMEOUT_MS") {
            cfg.delivery_timeout_ms = v;
        }
        if let Some(v) = read_env_parse("RELAY_UPDATE_INTERVAL_SECS") {
            cfg.update_interval_secs = v;
        }
        if let Some(v) = read_env_parse("RELAY_WARMUP_DELAY_SECS") {
            cfg.warmup_delay_secs = v;
        }
        if let Some(v) = read_env_parse("RELAY_PORT") {
            cfg.port = v;
        }
        if let Some(v) = read_env("RELAY_LOG_DIR") {
            cfg.log_dir = v;
        }
        cfg.chromium_path = read_env("RELAY_CHROMIUM_PATH");

        cfg
    }

    /// Reject configs whose URLs cannot possibly be navigated or POSTed to.
    /// A bad env var should fail at startup, not mid-cycle.
    pub fn validate(&self) -> RelayResult<()> {
        for (name, value) in [
            ("listing URL", &self.listing_url),
            ("destination URL", &self.destination_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| RelayError::Config(format!("{name} {value:?}: {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(RelayError::Config(format!(
                    "{name} {value:?}: scheme must be http or https"
                )));
            }
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    read_env(name).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();
        assert!(cfg.listing_url.starts_with("https://"));
        assert!(!cfg.selectors.price.is_empty());
        assert!(cfg.page_timeout_ms >= cfg.settle_delay_ms);
        assert_eq!(cfg.update_interval_secs, 300);
    }

    #[test]
    fn test_validate_rejects_unusable_urls() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_ok());

        cfg.destination_url = "not a url".to_string();
        assert!(cfg.validate().is_err());

        cfg.destination_url = "ftp://example.com/api".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_selector_list_is_ordered() {
        let sel = Selectors::default();
        // Primary strategy first; alternates after.
        assert!(sel.price[0].contains("headline5"));
        assert_eq!(sel.price.len(), 2);
    }
}
