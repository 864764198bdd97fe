//! Adaptive delivery of the scraped price to the downstream endpoint.
//!
//! Strictly two tiers, terminal on first success:
//!
//! ```text
//! LightweightAttempt → Delivered
//!                    → ChallengeDetected ┐
//!                    → TransportError    ┴→ EscalatedAttempt → Delivered
//!                                                            → Failure
//! ```
//!
//! The lightweight tier is a plain form-encoded POST. The escalated tier
//! drives a throwaway browser: it navigates to the destination first so the
//! site's challenge/cookie logic runs in a trusted origin, then issues the
//! POST from inside that page so the anti-bot cookies ride along. No
//! retries, no third tier.

pub mod challenge;

use crate::error::{RelayError, RelayResult};
use crate::renderer::EphemeralBrowser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Navigation bound for the escalation path.
const ESCALATION_NAV_TIMEOUT_MS: u64 = 30_000;

/// Wait after navigation for the challenge script to settle.
const ESCALATION_SETTLE_MS: u64 = 2_000;

/// Default timeout for the lightweight tier.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Response body, tagged by whether the transport already parsed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Json(_) => None,
        }
    }
}

/// Normalized response, identical in shape for both tiers. `headers` is
/// empty on the escalated path (the in-page fetch does not expose them),
/// so callers must not assume it is populated. `final_url` is present
/// only for escalated responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub data: ResponseBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

impl DeliveryResponse {
    /// 2xx means delivered; anything else is surfaced to the caller as a
    /// non-fatal failure.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-call options for [`DeliveryClient::deliver`].
#[derive(Debug, Clone, Default)]
pub struct DeliveryOptions {
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

/// Why the escalated tier ran.
#[derive(Debug, Clone)]
pub enum EscalationReason {
    ChallengeDetected,
    TransportError(String),
}

/// Delivers form-encoded payloads past possible bot mitigation.
pub struct DeliveryClient {
    http: reqwest::Client,
    chromium_path: Option<String>,
}

impl DeliveryClient {
    pub fn new(chromium_path: Option<String>) -> Self {
        // Timeouts are per-request; statuses never raise at the transport
        // level; classification happens on the body.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();
        Self {
            http,
            chromium_path,
        }
    }

    /// Deliver `fields` to `url`, escalating at most once.
    pub async fn deliver(
        &self,
        url: &str,
        fields: &[(String, String)],
        options: &DeliveryOptions,
    ) -> RelayResult<DeliveryResponse> {
        match self.lightweight_post(url, fields, options).await {
            Ok(response) => {
                if challenge::is_challenge(&response.data) {
                    info!("bot challenge detected, escalating to browser delivery");
                    self.escalated_post(url, fields, EscalationReason::ChallengeDetected)
                        .await
                } else {
                    Ok(response)
                }
            }
            Err(RelayError::TransportError(msg)) => {
                warn!("lightweight delivery failed ({msg}), escalating to browser delivery");
                self.escalated_post(url, fields, EscalationReason::TransportError(msg))
                    .await
            }
            Err(other) => Err(other),
        }
    }

    /// Tier 1: direct form-encoded POST. Any HTTP status is a non-throwing
    /// result; only sub-application failures (DNS, refused connection,
    /// timeout) surface as `TransportError`.
    pub async fn lightweight_post(
        &self,
        url: &str,
        fields: &[(String, String)],
        options: &DeliveryOptions,
    ) -> RelayResult<DeliveryResponse> {
        let timeout = Duration::from_millis(options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", "RateRelay", env!("CARGO_PKG_VERSION")));

        let mut builder = self
            .http
            .post(url)
            .timeout(timeout)
            .header("User-Agent", user_agent)
            .form(fields);
        for (name, value) in &options.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RelayError::TransportError(e.to_string()))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let is_json = headers
            .get("content-type")
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let text = response
            .text()
            .await
            .map_err(|e| RelayError::TransportError(e.to_string()))?;

        let data = if is_json {
            match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Json(value),
                // Declared JSON but unparseable: keep the text so the
                // challenge detector still sees it.
                Err(_) => ResponseBody::Text(text),
            }
        } else {
            ResponseBody::Text(text)
        };

        Ok(DeliveryResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            data,
            final_url: None,
        })
    }

    /// Tier 2: browser-driven POST from within the destination's own page
    /// context. The browser is ephemeral and closed on every path; a
    /// failure here propagates, there is no third tier.
    async fn escalated_post(
        &self,
        url: &str,
        fields: &[(String, String)],
        reason: EscalationReason,
    ) -> RelayResult<DeliveryResponse> {
        info!("escalated delivery to {url} (reason: {reason:?})");

        let browser = EphemeralBrowser::launch(self.chromium_path.as_deref()).await?;
        let result = escalated_post_inner(&browser, url, fields).await;
        browser.close().await;
        result
    }
}

/// Shape returned by the in-page fetch.
#[derive(Debug, Deserialize)]
struct InPageResponse {
    status: u16,
    #[serde(rename = "statusText", default)]
    status_text: String,
    url: String,
    data: serde_json::Value,
}

async fn escalated_post_inner(
    browser: &EphemeralBrowser,
    url: &str,
    fields: &[(String, String)],
) -> RelayResult<DeliveryResponse> {
    let page = browser.new_page("about:blank").await?;

    let result = async {
        // Navigate first so the challenge/cookie logic executes and the
        // later fetch runs from a trusted origin.
        tokio::time::timeout(
            Duration::from_millis(ESCALATION_NAV_TIMEOUT_MS),
            page.goto(url),
        )
        .await
        .map_err(|_| RelayError::NavigationTimeout {
            url: url.to_string(),
            timeout_ms: ESCALATION_NAV_TIMEOUT_MS,
        })?
        .map_err(|e| RelayError::NavigationTimeout {
            url: format!("{url} ({e})"),
            timeout_ms: ESCALATION_NAV_TIMEOUT_MS,
        })?;

        tokio::time::sleep(Duration::from_millis(ESCALATION_SETTLE_MS)).await;

        let script = in_page_post_script(url, fields);
        let evaluated = page
            .evaluate(script)
            .await
            .map_err(|e| RelayError::Evaluation(e.to_string()))?;
        let response: InPageResponse = evaluated
            .into_value()
            .map_err(|e| RelayError::Evaluation(format!("unexpected fetch value: {e:?}")))?;

        let data = match response.data {
            serde_json::Value::String(text) => ResponseBody::Text(text),
            value => ResponseBody::Json(value),
        };

        Ok(DeliveryResponse {
            status: response.status,
            status_text: response.status_text,
            // Not exposed in usable form by the in-page fetch.
            headers: BTreeMap::new(),
            data,
            final_url: Some(response.url),
        })
    }
    .await;

    if let Err(e) = page.close().await {
        warn!("error closing delivery page: {e}");
    }
    result
}

/// Build the in-page POST script. Fields land as a JSON object literal and
/// are re-encoded as `application/x-www-form-urlencoded` by the page's own
/// URLSearchParams, so the wire format matches the lightweight tier.
fn in_page_post_script(url: &str, fields: &[(String, String)]) -> String {
    let fields_map: BTreeMap<&str, &str> = fields
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let fields_json = serde_json::to_string(&fields_map).unwrap_or_else(|_| "{}".to_string());
    let url_json = serde_json::to_string(url).unwrap_or_default();
    format!(
        r#"(async () => {{
            const data = {fields_json};
            const body = new URLSearchParams();
            for (const key of Object.keys(data)) {{
                body.append(key, data[key]);
            }}
            const response = await fetch({url_json}, {{
                method: "POST",
                headers: {{ "Content-Type": "application/x-www-form-urlencoded" }},
                body: body.toString(),
            }});
            const contentType = response.headers.get("content-type") || "";
            const data2 = contentType.includes("application/json")
                ? await response.json()
                : await response.text();
            return {{
                status: response.status,
                statusText: response.statusText,
                url: response.url,
                data: data2,
            }};
        }})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_page_script_escapes_fields() {
        let fields = vec![
            ("price".to_string(), "389.00".to_string()),
            (
                "metadata".to_string(),
                "{\"avgPrice\":43.75}".to_string(),
            ),
        ];
        let script = in_page_post_script("https://example.com/api", &fields);
        assert!(script.contains(r#""https://example.com/api""#));
        // Nested JSON survives as an escaped string literal.
        assert!(script.contains(r#"{\"avgPrice\":43.75}"#));
        assert!(script.contains("URLSearchParams"));
    }

    #[test]
    fn test_response_success_window() {
        let mut resp = DeliveryResponse {
            status: 200,
            status_text: "OK".into(),
            headers: BTreeMap::new(),
            data: ResponseBody::Text(String::new()),
            final_url: None,
        };
        assert!(resp.is_success());
        resp.status = 299;
        assert!(resp.is_success());
        resp.status = 302;
        assert!(!resp.is_success());
        resp.status = 500;
        assert!(!resp.is_success());
    }

    #[test]
    fn test_final_url_omitted_for_lightweight_responses() {
        let resp = DeliveryResponse {
            status: 200,
            status_text: "OK".into(),
            headers: BTreeMap::from([("content-type".into(), "text/plain".into())]),
            data: ResponseBody::Text("ok".into()),
            final_url: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("finalUrl").is_none());
        assert_eq!(json["headers"]["content-type"], "text/plain");
    }

    #[test]
    fn test_escalated_response_shape_matches_lightweight() {
        let resp = DeliveryResponse {
            status: 200,
            status_text: "OK".into(),
            headers: BTreeMap::new(),
            data: ResponseBody::Json(serde_json::json!({"updated": true})),
            final_url: Some("https://example.com/api".into()),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], 200);
        assert_eq!(json["data"]["updated"], true);
        assert_eq!(json["finalUrl"], "https://example.com/api");
        assert!(json["headers"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_in_page_response_deserializes() {
        let v = serde_json::json!({
            "status": 200,
            "statusText": "OK",
            "url": "https://example.com/api",
            "data": { "updated": true }
        });
        let r: InPageResponse = serde_json::from_value(v).unwrap();
        assert_eq!(r.status, 200);
        assert_eq!(r.url, "https://example.com/api");
        assert!(r.data.is_object());
    }
}
