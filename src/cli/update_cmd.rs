//! One-off full cycle: extract, then deliver to the destination.

use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::pipeline;
use crate::renderer::BrowserManager;
use crate::scraper::QuoteExtractor;
use std::sync::Arc;

pub async fn run() -> anyhow::Result<()> {
    crate::cli::init_tracing();

    let config = Config::from_env();
    config.validate()?;
    let browser = Arc::new(BrowserManager::new(&config));
    let extractor = QuoteExtractor::new(config.clone(), Arc::clone(&browser));
    let delivery = DeliveryClient::new(config.chromium_path.clone());

    let result = pipeline::run_cycle(&config, &extractor, &delivery).await;
    browser.release().await;

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("cycle failed ({}): {e}", e.kind());
            std::process::exit(1);
        }
    }
}
