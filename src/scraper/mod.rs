//! Quote extraction from the client-rendered marketplace listing.
//!
//! One extraction cycle opens an ephemeral page on the shared browser,
//! renders the listing, pulls raw price text out of every offer container,
//! parses and validates the values, and reduces them to min/avg/max. The
//! page is closed on every exit path; the browser instance never is.

pub mod price;

use crate::config::Config;
use crate::error::{RelayError, RelayResult};
use crate::renderer::BrowserManager;
use chromiumoxide::page::Page;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How many offers are carried in the result payload for observability.
/// Statistics always cover all valid offers, not just the sample.
const SAMPLE_SIZE: usize = 10;

/// Poll interval while waiting for the listing container to appear.
const SELECTOR_POLL_MS: u64 = 250;

/// One offer as captured from the page, before parsing.
#[derive(Debug, Clone, Deserialize)]
struct RawOffer {
    index: usize,
    #[serde(rename = "rawText")]
    raw_text: String,
    /// First fragment of the container markup, for selector diagnostics.
    #[serde(default)]
    snippet: String,
}

/// One offer with its parsed price. Ephemeral: produced per cycle,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub index: usize,
    #[serde(rename = "rawText")]
    pub raw_text: String,
    pub price: f64,
}

/// Aggregate statistics plus a bounded offer sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionData {
    pub best_price: f64,
    pub avg_price: f64,
    pub max_price: f64,
    pub total_offers: usize,
    pub prices: Vec<Offer>,
}

/// Result envelope for one extraction cycle. `data` is present iff
/// `success` is true; failures never escape this boundary as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractionData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extracts quotes from the configured listing page.
pub struct QuoteExtractor {
    config: Config,
    browser: Arc<BrowserManager>,
}

impl QuoteExtractor {
    pub fn new(config: Config, browser: Arc<BrowserManager>) -> Self {
        Self { config, browser }
    }

    /// Run one extraction cycle and wrap the outcome in the result
    /// envelope. Single attempt; the scheduler's next tick is the retry.
    pub async fn scrape(&self) -> ExtractionResult {
        let timestamp = Utc::now().to_rfc3339();
        match self.extract().await {
            Ok(data) => ExtractionResult {
                success: true,
                timestamp,
                data: Some(data),
                error: None,
            },
            Err(e) => {
                warn!("extraction failed: {e}");
                ExtractionResult {
                    success: false,
                    timestamp,
                    data: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Core extraction, with typed failures for callers that need to
    /// distinguish them (the pipeline short-circuits on any of these).
    pub async fn extract(&self) -> RelayResult<ExtractionData> {
        info!("scraping {}", self.config.listing_url);

        let handle = self.browser.acquire().await?;
        let page = handle.new_page("about:blank").await?;

        // Everything page-scoped happens in extract_from_page so the close
        // below runs on every exit path, success or failure.
        let result = self.extract_from_page(&page).await;
        if let Err(e) = page.close().await {
            warn!("error closing extraction page: {e}");
        }
        result
    }

    async fn extract_from_page(&self, page: &Page) -> RelayResult<ExtractionData> {
        let url = &self.config.listing_url;
        let timeout = Duration::from_millis(self.config.page_timeout_ms);
        let settle = Duration::from_millis(self.config.settle_delay_ms);

        // Navigation must complete within the bound; this one is fatal.
        tokio::time::timeout(timeout, page.goto(url.as_str()))
            .await
            .map_err(|_| RelayError::NavigationTimeout {
                url: url.clone(),
                timeout_ms: self.config.page_timeout_ms,
            })?
            .map_err(|e| RelayError::NavigationTimeout {
                url: format!("{url} ({e})"),
                timeout_ms: self.config.page_timeout_ms,
            })?;

        // Primary wait: full load. The listing is a client-rendered SPA, so
        // a failed wait falls back to a fixed settle delay instead of
        // failing the cycle.
        match tokio::time::timeout(timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            _ => {
                debug!("primary navigation wait failed, falling back to settle delay");
                tokio::time::sleep(settle).await;
            }
        }

        // The offer list renders asynchronously; wait for its container.
        // A missing container past the bound is partial-render tolerance,
        // not fatal; extraction below decides whether anything is usable.
        if !self
            .wait_for_selector(page, &self.config.selectors.container, timeout)
            .await
        {
            warn!(
                "listing container never appeared: {}",
                self.config.selectors.container
            );
            tokio::time::sleep(settle).await;
        }

        // Let asynchronous rendering finish before reading the DOM.
        tokio::time::sleep(settle).await;

        let raw = self.capture_offers(page).await?;
        info!("captured {} offer elements", raw.len());

        let mut values = Vec::with_capacity(raw.len());
        let mut sample = Vec::new();
        for offer in &raw {
            match price::parse_price(&offer.raw_text) {
                Some(price) => {
                    debug!("raw {:?} -> {price}", offer.raw_text);
                    if sample.len() < SAMPLE_SIZE {
                        sample.push(Offer {
                            index: offer.index,
                            raw_text: offer.raw_text.clone(),
                            price,
                        });
                    }
                    values.push(price);
                }
                None => {
                    debug!(
                        "dropping unparseable offer {}: {:?} ({})",
                        offer.index,
                        offer.raw_text,
                        crate::audit::truncate(&offer.snippet, 120)
                    );
                }
            }
        }

        let stats = price::aggregate(&values).ok_or(RelayError::NoValidPrices)?;
        info!(
            "best {:.2} / avg {:.2} / max {:.2} over {} offers",
            stats.best, stats.avg, stats.max, stats.count
        );

        Ok(ExtractionData {
            best_price: stats.best,
            avg_price: stats.avg,
            max_price: stats.max,
            total_offers: stats.count,
            prices: sample,
        })
    }

    /// Poll for a selector until it matches or the bound expires.
    async fn wait_for_selector(&self, page: &Page, selector: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(SELECTOR_POLL_MS)).await;
        }
    }

    /// Read raw offers out of the rendered DOM.
    async fn capture_offers(&self, page: &Page) -> RelayResult<Vec<RawOffer>> {
        let script = extraction_script(&self.config.selectors.container, &self.config.selectors.price);
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| RelayError::Evaluation(e.to_string()))?;
        result
            .into_value::<Vec<RawOffer>>()
            .map_err(|e| RelayError::Evaluation(format!("unexpected extraction value: {e:?}")))
    }
}

/// Build the in-page extraction script. The price selectors form an
/// ordered strategy list (first non-empty match per container wins) so
/// new fallbacks are configuration, not control flow.
fn extraction_script(container: &str, price_selectors: &[String]) -> String {
    let container_json = serde_json::to_string(container).unwrap_or_default();
    let selectors_json = serde_json::to_string(price_selectors).unwrap_or_default();
    format!(
        r#"(() => {{
            const containers = document.querySelectorAll({container_json});
            const strategies = {selectors_json};
            const out = [];
            containers.forEach((card, index) => {{
                let el = null;
                for (const sel of strategies) {{
                    el = card.querySelector(sel);
                    if (el) break;
                }}
                if (el) {{
                    const text = el.textContent || el.innerText || "";
                    out.push({{
                        index: index,
                        rawText: text.trim(),
                        snippet: card.innerHTML.substring(0, 200),
                    }});
                }}
            }});
            return out;
        }})()"#
    )
}
