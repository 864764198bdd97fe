//! One-off extraction cycle, result printed as JSON.

use crate::config::Config;
use crate::renderer::BrowserManager;
use crate::scraper::QuoteExtractor;
use std::sync::Arc;

pub async fn run() -> anyhow::Result<()> {
    crate::cli::init_tracing();

    let config = Config::from_env();
    config.validate()?;
    let browser = Arc::new(BrowserManager::new(&config));
    let extractor = QuoteExtractor::new(config, Arc::clone(&browser));

    let result = extractor.scrape().await;
    browser.release().await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
