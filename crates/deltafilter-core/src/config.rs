//! Textual filter configuration as supplied by the host.
//!
//! Values stay strings until a filter interprets them. Interpretation is
//! lenient: the longest leading numeric prefix counts (`"10%"` is `10`) and a
//! value without one reads as zero, so bad input degrades instead of failing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TOLERANCE: &str = "1";
pub const DEFAULT_MIN_RATE: &str = "0";
pub const DEFAULT_RATE_UNIT: &str = "per second";

/// The three configuration items of a delta filter.
///
/// Deserializes from `{"tolerance": .., "minRate": .., "rateUnit": ..}` where
/// numeric items may be JSON strings or numbers. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Percentage change required before a value counts as different.
    #[serde(deserialize_with = "string_or_number")]
    pub tolerance: String,
    /// Minimum number of readings per `rate_unit`; zero disables the rate check.
    #[serde(rename = "minRate", deserialize_with = "string_or_number")]
    pub min_rate: String,
    /// One of "per second", "per minute", "per hour", "per day".
    #[serde(rename = "rateUnit")]
    pub rate_unit: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE.into(),
            min_rate: DEFAULT_MIN_RATE.into(),
            rate_unit: DEFAULT_RATE_UNIT.into(),
        }
    }
}

impl FilterConfig {
    pub fn new(
        tolerance: impl Into<String>,
        min_rate: impl Into<String>,
        rate_unit: impl Into<String>,
    ) -> Self {
        Self {
            tolerance: tolerance.into(),
            min_rate: min_rate.into(),
            rate_unit: rate_unit.into(),
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Tolerance as a percentage; unparseable or non-finite values read as `0.0`.
    #[must_use]
    pub fn tolerance_percent(&self) -> f64 {
        leading_float(&self.tolerance)
    }

    /// Minimum rate count; unparseable values read as `0`.
    #[must_use]
    pub fn min_rate_count(&self) -> i64 {
        leading_int(&self.min_rate)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, found {other}"
        ))),
    }
}

fn leading_float(text: &str) -> f64 {
    let text = text.trim();
    let numeric_len = text
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .unwrap_or(text.len());
    let candidate = &text[..numeric_len];
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn leading_int(text: &str) -> i64 {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = &unsigned[..end];
    if digits.is_empty() {
        return 0;
    }
    // saturate like strtol
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    if negative {
        -magnitude
    } else {
        magnitude
    }
}
