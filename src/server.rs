//! HTTP front door.
//!
//! Thin wrappers over the pipeline: read endpoints return the extractor's
//! result verbatim or reduced, the write endpoint runs one full cycle
//! synchronously. No core logic lives here.

use crate::audit::{AuditLog, CycleRecord};
use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::pipeline;
use crate::scraper::QuoteExtractor;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared state for all handlers.
pub struct AppState {
    pub config: Config,
    pub extractor: QuoteExtractor,
    pub delivery: DeliveryClient,
    pub audit: AuditLog,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/scrape", get(handle_scrape))
        .route("/averages", get(handle_averages))
        .route("/update-rate", post(handle_update_rate))
        .route("/config", get(handle_config))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Serve until the listener fails. Shutdown is handled by the caller
/// dropping this future.
pub async fn start(state: Arc<AppState>) -> anyhow::Result<()> {
    let port = state.config.port;
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP front door listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "rate-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Full extraction result, verbatim.
async fn handle_scrape(State(state): State<Arc<AppState>>) -> Json<Value> {
    let started = Instant::now();
    let result = state.extractor.scrape().await;

    let mut rec = CycleRecord::new("scrape");
    rec.success = result.success;
    rec.error = result.error.clone();
    rec.duration_ms = started.elapsed().as_millis() as u64;
    state.audit.record(&rec);

    Json(serde_json::to_value(&result).unwrap_or_else(|_| json!({ "success": false })))
}

/// Reduced summary of one extraction.
async fn handle_averages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = Instant::now();
    let result = state.extractor.scrape().await;

    let mut rec = CycleRecord::new("averages");
    rec.success = result.success;
    rec.error = result.error.clone();
    rec.duration_ms = started.elapsed().as_millis() as u64;
    state.audit.record(&rec);

    match result.data {
        Some(data) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "timestamp": result.timestamp,
                "data": {
                    "bestPrice": data.best_price,
                    "avgPrice": data.avg_price,
                    "maxPrice": data.max_price,
                    "totalOffers": data.total_offers,
                },
            })),
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": result.error,
                "timestamp": result.timestamp,
            })),
        ),
    }
}

/// Run the full cycle synchronously and report the destination's answer.
async fn handle_update_rate(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = Instant::now();

    match pipeline::run_cycle(&state.config, &state.extractor, &state.delivery).await {
        Ok(outcome) => {
            let mut rec = CycleRecord::new("update-rate");
            rec.success = outcome.success;
            rec.status = Some(outcome.delivery_response.status);
            rec.duration_ms = outcome.total_ms;
            rec.detail = Some(json!({
                "newPrice": outcome.new_price,
                "totalOffers": outcome.scrape_info.total_offers,
            }));
            state.audit.record(&rec);

            let message = if outcome.success {
                "Rate updated successfully"
            } else {
                "Request sent but destination answered a non-success status"
            };
            (
                StatusCode::OK,
                Json(json!({
                    "success": outcome.success,
                    "message": message,
                    "statusCode": outcome.delivery_response.status,
                    "statusText": outcome.delivery_response.status_text,
                    "duration": {
                        "total": outcome.total_ms,
                        "request": outcome.delivery_ms,
                    },
                    "data": {
                        "newPrice": outcome.new_price,
                        "scrapeInfo": outcome.scrape_info,
                        "deliveryResponse": outcome.delivery_response,
                    },
                })),
            )
        }
        Err(e) => {
            let duration = started.elapsed().as_millis() as u64;
            let mut rec = CycleRecord::new("update-rate");
            rec.error = Some(e.to_string());
            rec.error_kind = Some(e.kind().to_string());
            rec.duration_ms = duration;
            state.audit.record(&rec);

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": e.to_string(),
                    "errorName": e.kind(),
                    "timestamp": Utc::now().to_rfc3339(),
                    "duration": duration,
                })),
            )
        }
    }
}

/// Configuration introspection.
async fn handle_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "listingUrl": state.config.listing_url,
        "destinationUrl": state.config.destination_url,
        "updateIntervalSecs": state.config.update_interval_secs,
        "pageTimeoutMs": state.config.page_timeout_ms,
        // The design has no internal retry; the scheduler tick is the
        // retry mechanism.
        "retryAttempts": 0,
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Endpoint not found",
            "availableEndpoints": [
                "GET /health",
                "GET /scrape",
                "GET /averages",
                "POST /update-rate",
                "GET /config",
            ],
        })),
    )
}
