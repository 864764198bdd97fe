//! One acquisition cycle: extract → select a representative price → deliver.
//!
//! Strictly sequential. A failed extraction short-circuits before any
//! network call to the destination; a non-2xx delivery is a surfaced
//! non-fatal failure, not an error.

use crate::config::{Config, SOURCE_ID};
use crate::delivery::{DeliveryClient, DeliveryOptions, DeliveryResponse};
use crate::error::RelayResult;
use crate::scraper::{ExtractionData, QuoteExtractor};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of one full cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// True iff the destination answered 2xx.
    pub success: bool,
    pub new_price: f64,
    pub scrape_info: ExtractionData,
    pub delivery_response: DeliveryResponse,
    pub scrape_ms: u64,
    pub delivery_ms: u64,
    pub total_ms: u64,
}

/// Run one cycle. Extraction failures and escalation failures propagate as
/// typed errors; the caller (scheduler or HTTP handler) decides how to
/// surface them.
pub async fn run_cycle(
    config: &Config,
    extractor: &QuoteExtractor,
    delivery: &DeliveryClient,
) -> RelayResult<CycleOutcome> {
    let started = Instant::now();

    info!("cycle: extracting quotes");
    let data = extractor.extract().await?;
    let scrape_ms = started.elapsed().as_millis() as u64;

    // The minimum observed ask is the representative price.
    let new_price = data.best_price;
    info!(
        "cycle: delivering best price {:.2} ({} offers) to {}",
        new_price, data.total_offers, config.destination_url
    );

    let fields = build_form_fields(&data);
    let options = DeliveryOptions {
        timeout_ms: Some(config.delivery_timeout_ms),
        user_agent: None,
        extra_headers: Vec::new(),
    };

    let delivery_started = Instant::now();
    let response = delivery
        .deliver(&config.destination_url, &fields, &options)
        .await?;
    let delivery_ms = delivery_started.elapsed().as_millis() as u64;

    let success = response.is_success();
    if success {
        info!("cycle: destination accepted the update ({})", response.status);
    } else {
        warn!(
            "cycle: destination answered non-success status {}",
            response.status
        );
    }

    Ok(CycleOutcome {
        success,
        new_price,
        scrape_info: data,
        delivery_response: response,
        scrape_ms,
        delivery_ms,
        total_ms: started.elapsed().as_millis() as u64,
    })
}

/// The destination's form contract: `price`, `notes`, `source`, `metadata`.
fn build_form_fields(data: &ExtractionData) -> Vec<(String, String)> {
    let metadata = serde_json::json!({
        "avgPrice": data.avg_price,
        "maxPrice": data.max_price,
        "totalOffers": data.total_offers,
        "timestamp": Utc::now().to_rfc3339(),
    });

    vec![
        ("price".to_string(), format!("{:.2}", data.best_price)),
        (
            "notes".to_string(),
            format!(
                "Automatic update from P2P marketplace. {} offers analyzed.",
                data.total_offers
            ),
        ),
        ("source".to_string(), SOURCE_ID.to_string()),
        ("metadata".to_string(), metadata.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> ExtractionData {
        ExtractionData {
            best_price: 389.0,
            avg_price: 390.12,
            max_price: 395.5,
            total_offers: 14,
            prices: vec![],
        }
    }

    #[test]
    fn test_form_fields_contract() {
        let fields = build_form_fields(&sample_data());
        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["price", "notes", "source", "metadata"]);

        assert_eq!(fields[0].1, "389.00");
        assert!(fields[1].1.contains("14 offers"));
        assert_eq!(fields[2].1, "rate-relay");
    }

    #[test]
    fn test_metadata_is_json_encoded_string() {
        let fields = build_form_fields(&sample_data());
        let metadata: serde_json::Value = serde_json::from_str(&fields[3].1).unwrap();
        assert_eq!(metadata["avgPrice"], 390.12);
        assert_eq!(metadata["maxPrice"], 395.5);
        assert_eq!(metadata["totalOffers"], 14);
        assert!(metadata["timestamp"].as_str().unwrap().contains('T'));
    }
}
