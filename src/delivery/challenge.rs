//! Bot-mitigation challenge detection.

use crate::delivery::ResponseBody;

/// Literal markers of the interstitial the destination serves in front of
/// its endpoints when it suspects automation.
pub const CHALLENGE_MARKERS: &[&str] = &[
    "slowAES.decrypt",
    "__test=",
    "This site requires Javascript to work",
];

/// Classify a response body. Only textual bodies can be challenges; a body
/// that already parsed as structured data cannot be an interstitial.
pub fn is_challenge(body: &ResponseBody) -> bool {
    match body {
        ResponseBody::Text(text) => CHALLENGE_MARKERS.iter().any(|m| text.contains(m)),
        ResponseBody::Json(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_in_text_body_is_challenge() {
        let body = ResponseBody::Text(
            "<html>This site requires Javascript to work, please enable it</html>".into(),
        );
        assert!(is_challenge(&body));

        let body = ResponseBody::Text("var x = slowAES.decrypt(c, 2, a, b);".into());
        assert!(is_challenge(&body));

        let body = ResponseBody::Text("document.cookie = \"__test=\" + toHex(x);".into());
        assert!(is_challenge(&body));
    }

    #[test]
    fn test_plain_text_is_not_challenge() {
        let body = ResponseBody::Text("{\"ok\":true}".into());
        assert!(!is_challenge(&body));
    }

    #[test]
    fn test_structured_body_is_never_challenge() {
        // Even if a JSON value happens to carry a marker string.
        let body = ResponseBody::Json(serde_json::json!({
            "note": "This site requires Javascript to work"
        }));
        assert!(!is_challenge(&body));
    }
}
