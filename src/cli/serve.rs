//! Start the relay service: HTTP front door plus the periodic scheduler.

use crate::audit::AuditLog;
use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::renderer::BrowserManager;
use crate::scheduler;
use crate::scraper::QuoteExtractor;
use crate::server::{self, AppState};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    crate::cli::init_tracing();

    let mut config = Config::from_env();
    config.validate()?;
    if let Some(port) = port_override {
        config.port = port;
    }

    info!(
        "starting rate-relay v{} (listing: {}, destination: {})",
        env!("CARGO_PKG_VERSION"),
        config.listing_url,
        config.destination_url
    );

    // Shared browser for extraction; delivery escalation launches its own
    // ephemeral instances and never touches this one.
    let browser = Arc::new(BrowserManager::new(&config));

    let state = Arc::new(AppState {
        extractor: QuoteExtractor::new(config.clone(), Arc::clone(&browser)),
        delivery: DeliveryClient::new(config.chromium_path.clone()),
        audit: AuditLog::new(&config.log_dir),
        config,
    });

    let shutdown = Arc::new(Notify::new());

    // SIGINT/SIGTERM → notify everyone.
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        signal_shutdown.notify_waiters();
    });

    let scheduler_state = Arc::clone(&state);
    let scheduler_shutdown = Arc::clone(&shutdown);
    let scheduler_task =
        tokio::spawn(async move { scheduler::run(scheduler_state, scheduler_shutdown).await });

    // Serve until shutdown; the server future is dropped on signal.
    tokio::select! {
        result = server::start(Arc::clone(&state)) => result?,
        _ = shutdown.notified() => {}
    }

    let _ = scheduler_task.await;

    // Release the shared browser only here, at process shutdown.
    browser.release().await;
    info!("rate-relay stopped");
    Ok(())
}
