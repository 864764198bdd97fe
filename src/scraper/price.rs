//! Price text parsing and aggregation.
//!
//! The marketplace renders quotes as e.g. `"Bs. 389.000"`. The point is the
//! DECIMAL separator, US style: `389.000` is 389.0, not 389000. Commas are
//! stripped outright as accidental formatting, never interpreted as
//! thousands grouping. This convention is load-bearing: if the site ever
//! switches to European grouping (`1.234,56`) these rules mis-parse, so the
//! behavior is locked to literal test vectors below.

use regex::Regex;
use std::sync::OnceLock;

/// Numeric substring following the currency marker.
fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Bs\.?\s*([0-9][0-9.,]*)").expect("valid price pattern"))
}

/// Parse a raw price text into a value, or `None` if the text carries no
/// usable price. Invalid offers are dropped by the caller, never fatal.
pub fn parse_price(raw: &str) -> Option<f64> {
    let caps = price_pattern().captures(raw)?;
    let cleaned = caps.get(1)?.as_str().trim().replace(',', "");

    let price: f64 = cleaned.parse().ok()?;
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    Some(price)
}

/// Round to two fractional digits, the precision the destination accepts.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Summary statistics over the valid offers of one extraction cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceStats {
    /// Minimum, used as the representative price forwarded downstream.
    pub best: f64,
    pub avg: f64,
    pub max: f64,
    pub count: usize,
}

/// Compute min/avg/max over the parsed prices. `None` for an empty slice;
/// zero valid offers is a failure upstream, never zero-filled statistics.
pub fn aggregate(prices: &[f64]) -> Option<PriceStats> {
    if prices.is_empty() {
        return None;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &p in prices {
        min = min.min(p);
        max = max.max(p);
        sum += p;
    }

    Some(PriceStats {
        best: round2(min),
        avg: round2(sum / prices.len() as f64),
        max: round2(max),
        count: prices.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_point_is_fractional_separator() {
        assert_eq!(parse_price("Bs. 389.000"), Some(389.0));
        assert_eq!(parse_price("Bs. 390.500"), Some(390.5));
        assert_eq!(parse_price("Bs. 45.123"), Some(45.123));
    }

    #[test]
    fn test_commas_are_stripped_not_grouping() {
        // Literal stripping, no thousands-grouping inference.
        assert_eq!(parse_price("Bs.390,500"), Some(390500.0));
        assert_eq!(parse_price("Bs. 1,234.56"), Some(1234.56));
    }

    #[test]
    fn test_marker_variants() {
        assert_eq!(parse_price("Bs.389.000"), Some(389.0));
        assert_eq!(parse_price("Bs 410.25"), Some(410.25));
        assert_eq!(parse_price("  Bs. 389.000 VES  "), Some(389.0));
    }

    #[test]
    fn test_no_digits_after_marker() {
        assert_eq!(parse_price("Bs. "), None);
        assert_eq!(parse_price("Bs. precio"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_missing_marker() {
        assert_eq!(parse_price("389.000"), None);
        assert_eq!(parse_price("USD 389.000"), None);
    }

    #[test]
    fn test_non_positive_is_dropped() {
        assert_eq!(parse_price("Bs. 0"), None);
        assert_eq!(parse_price("Bs. 0.00"), None);
    }

    #[test]
    fn test_aggregate_known_vector() {
        let stats = aggregate(&[41.0, 43.5, 45.25, 45.25]).unwrap();
        assert_eq!(stats.best, 41.0);
        assert_eq!(stats.avg, 43.75);
        assert_eq!(stats.max, 45.25);
        assert_eq!(stats.count, 4);
    }

    #[test]
    fn test_aggregate_single_offer() {
        let stats = aggregate(&[389.0]).unwrap();
        assert_eq!(stats.best, 389.0);
        assert_eq!(stats.avg, 389.0);
        assert_eq!(stats.max, 389.0);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_aggregate_empty_is_none() {
        assert_eq!(aggregate(&[]), None);
    }

    #[test]
    fn test_aggregate_rounds_to_two_digits() {
        let stats = aggregate(&[10.0, 10.006]).unwrap();
        assert_eq!(stats.avg, 10.0);
        assert_eq!(stats.max, 10.01);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(43.754), 43.75);
        assert_eq!(round2(43.756), 43.76);
    }
}
