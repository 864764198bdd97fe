//! Selector diagnostics for the listing page.
//!
//! When extraction starts reporting `NoValidPrices`, the page structure
//! has usually changed. This command renders the listing and reports which
//! candidate container selectors match elements that carry price-like
//! text, so the selector configuration can be updated without guesswork.

use crate::config::Config;
use crate::error::RelayError;
use crate::renderer::EphemeralBrowser;
use serde::Deserialize;
use std::time::Duration;

/// Container candidates, most specific first.
const CANDIDATE_SELECTORS: &[&str] = &[
    ".bn-flex.flex-col.border-b.border-b-line.py-l",
    "div[class*=\"advertise\"]",
    "div[class*=\"order\"]",
    "div[class*=\"card\"]",
    "[role=\"row\"]",
    "[class*=\"trade\"]",
    "tbody tr",
];

#[derive(Debug, Deserialize)]
struct SelectorReport {
    selector: String,
    count: usize,
    #[serde(rename = "hasPrice")]
    has_price: bool,
    sample: String,
}

pub async fn run(url_override: Option<&str>) -> anyhow::Result<()> {
    crate::cli::init_tracing();

    let config = Config::from_env();
    let url = url_override.unwrap_or(&config.listing_url);
    println!("Inspecting selectors on {url}\n");

    let browser = EphemeralBrowser::launch(config.chromium_path.as_deref()).await?;
    let result = inspect(&browser, url, &config).await;
    browser.close().await;

    let reports = result?;
    if reports.is_empty() {
        println!("No candidate selector matched any element.");
        return Ok(());
    }

    for report in &reports {
        println!(
            "  {:>4} elements  price:{}  {}",
            report.count,
            if report.has_price { "yes" } else { "no " },
            report.selector
        );
        if report.has_price {
            println!("        sample: {}", crate::audit::truncate(&report.sample, 120));
        }
    }

    println!("\nConfigure the best match via RELAY_CONTAINER_SELECTOR.");
    Ok(())
}

async fn inspect(
    browser: &EphemeralBrowser,
    url: &str,
    config: &Config,
) -> anyhow::Result<Vec<SelectorReport>> {
    let page = browser.new_page("about:blank").await?;

    let result = async {
        tokio::time::timeout(
            Duration::from_millis(config.page_timeout_ms),
            page.goto(url),
        )
        .await
        .map_err(|_| RelayError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: config.page_timeout_ms,
        })??;
        tokio::time::sleep(Duration::from_millis(config.settle_delay_ms * 2)).await;

        let evaluated = page
            .evaluate(inspection_script())
            .await
            .map_err(|e| RelayError::Evaluation(e.to_string()))?;
        let reports: Vec<SelectorReport> = evaluated
            .into_value()
            .map_err(|e| RelayError::Evaluation(format!("unexpected inspection value: {e:?}")))?;
        Ok::<_, anyhow::Error>(reports)
    }
    .await;

    let _ = page.close().await;
    result
}

fn inspection_script() -> String {
    let candidates_json =
        serde_json::to_string(CANDIDATE_SELECTORS).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
            const candidates = {candidates_json};
            const pricePattern = /Bs\.?\s*[0-9]/;
            const out = [];
            for (const selector of candidates) {{
                let elements;
                try {{
                    elements = document.querySelectorAll(selector);
                }} catch (e) {{
                    continue;
                }}
                if (elements.length === 0 || elements.length >= 200) continue;
                let hasPrice = false;
                let sample = "";
                elements.forEach(el => {{
                    if (!hasPrice && pricePattern.test(el.textContent)) {{
                        hasPrice = true;
                        sample = (el.textContent || "").trim().substring(0, 150);
                    }}
                }});
                out.push({{
                    selector: selector,
                    count: elements.length,
                    hasPrice: hasPrice,
                    sample: sample,
                }});
            }}
            return out;
        }})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspection_script_embeds_candidates() {
        let script = inspection_script();
        assert!(script.contains("advertise"));
        assert!(script.contains("querySelectorAll"));
        assert!(script.contains("pricePattern"));
    }

    #[test]
    fn test_selector_report_deserializes() {
        let v = serde_json::json!([{
            "selector": "tbody tr",
            "count": 12,
            "hasPrice": true,
            "sample": "Bs. 389.000"
        }]);
        let reports: Vec<SelectorReport> = serde_json::from_value(v).unwrap();
        assert_eq!(reports[0].count, 12);
        assert!(reports[0].has_price);
    }
}
