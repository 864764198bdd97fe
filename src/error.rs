//! Error taxonomy for the acquisition and delivery pipeline.

/// Errors that can occur while acquiring or delivering a rate.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The browser instance could not start. Fatal to the current cycle,
    /// never retried internally; the scheduler's next tick retries.
    #[error("Browser launch failed: {0}")]
    LaunchFailure(String),

    /// A page did not load within its bound.
    #[error("Navigation timed out after {timeout_ms}ms: {url}")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Extraction produced zero parseable offers. Signals a page-structure
    /// or selector mismatch, not a transport problem.
    #[error("No valid prices extracted from the listing page")]
    NoValidPrices,

    /// The lightweight HTTP attempt failed below the application layer
    /// (DNS, connection refused, timeout). Triggers escalation.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// In-page script execution failed or returned an unusable value.
    #[error("Page evaluation failed: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Stable short name for log records and HTTP error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "Config",
            Self::LaunchFailure(_) => "LaunchFailure",
            Self::NavigationTimeout { .. } => "NavigationTimeout",
            Self::NoValidPrices => "NoValidPrices",
            Self::TransportError(_) => "TransportError",
            Self::Evaluation(_) => "Evaluation",
            Self::Io(_) => "Io",
        }
    }
}

/// Convenience result type.
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(RelayError::NoValidPrices.kind(), "NoValidPrices");
        assert_eq!(
            RelayError::LaunchFailure("boom".into()).kind(),
            "LaunchFailure"
        );
        assert_eq!(
            RelayError::TransportError("refused".into()).kind(),
            "TransportError"
        );
    }
}
