//! Periodic cycle trigger.
//!
//! Runs one cycle after a short warm-up, then on a fixed interval until
//! shutdown. A failed cycle is logged and tolerated; the next tick is the
//! retry mechanism, and nothing here crashes the process.

use crate::audit::{AuditLog, CycleRecord};
use crate::pipeline;
use crate::server::AppState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info};

pub async fn run(state: Arc<AppState>, shutdown: Arc<Notify>) {
    let warmup = Duration::from_secs(state.config.warmup_delay_secs);
    let interval = Duration::from_secs(state.config.update_interval_secs);

    info!(
        "scheduler: first cycle in {}s, then every {}s",
        warmup.as_secs(),
        interval.as_secs()
    );

    tokio::select! {
        _ = tokio::time::sleep(warmup) => {}
        _ = shutdown.notified() => {
            info!("scheduler: shutdown before first cycle");
            return;
        }
    }

    loop {
        run_one(&state, &state.audit).await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => {
                info!("scheduler: shutting down");
                return;
            }
        }
    }
}

async fn run_one(state: &AppState, audit: &AuditLog) {
    let started = Instant::now();
    let mut rec = CycleRecord::new("scheduler");

    match pipeline::run_cycle(&state.config, &state.extractor, &state.delivery).await {
        Ok(outcome) => {
            rec.success = outcome.success;
            rec.status = Some(outcome.delivery_response.status);
            rec.duration_ms = outcome.total_ms;
            info!(
                "scheduled cycle done in {}ms (price {:.2}, status {})",
                outcome.total_ms, outcome.new_price, outcome.delivery_response.status
            );
        }
        Err(e) => {
            rec.error = Some(e.to_string());
            rec.error_kind = Some(e.kind().to_string());
            rec.duration_ms = started.elapsed().as_millis() as u64;
            error!("scheduled cycle failed: {e}");
        }
    }

    audit.record(&rec);
}
