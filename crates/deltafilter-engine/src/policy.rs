//! Translation of the textual [`FilterConfig`] into a [`DeltaPolicy`].

use crate::error::{FilterError, Result};
use deltafilter_core::FilterConfig;
use std::fmt;
use std::str::FromStr;
use time::Duration;

/// Unit of the minimum forwarding rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateUnit {
    PerSecond,
    PerMinute,
    PerHour,
    PerDay,
}

impl RateUnit {
    /// Time allowed between forwarded readings for `count` readings per unit.
    ///
    /// Integer division on purpose: `PerSecond` works in microseconds, the
    /// other units in whole seconds, so a count above 60 per minute yields a
    /// zero interval and the rate check switches off.
    ///
    /// `count` must be positive.
    #[must_use]
    pub fn interval(self, count: i64) -> Duration {
        debug_assert!(count > 0, "rate count must be positive");
        match self {
            Self::PerSecond => Duration::microseconds(1_000_000 / count),
            Self::PerMinute => Duration::seconds(60 / count),
            Self::PerHour => Duration::seconds(3_600 / count),
            Self::PerDay => Duration::seconds(86_400 / count),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerSecond => "per second",
            Self::PerMinute => "per minute",
            Self::PerHour => "per hour",
            Self::PerDay => "per day",
        }
    }
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateUnit {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "per second" => Ok(Self::PerSecond),
            "per minute" => Ok(Self::PerMinute),
            "per hour" => Ok(Self::PerHour),
            "per day" => Ok(Self::PerDay),
            other => Err(FilterError::UnknownRateUnit(other.to_string())),
        }
    }
}

/// Tolerance and rate settings every asset is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaPolicy {
    /// Percentage of the last forwarded value a change has to exceed.
    pub tolerance: f64,
    /// Longest gap in reading time before a reading is forwarded regardless
    /// of its values. Zero disables the rate check.
    pub min_interval: Duration,
}

/// The policy of an unconfigured filter: the default configuration's
/// tolerance and no rate constraint.
impl Default for DeltaPolicy {
    fn default() -> Self {
        Self::new(FilterConfig::default().tolerance_percent(), Duration::ZERO)
    }
}

impl DeltaPolicy {
    #[must_use]
    pub const fn new(tolerance: f64, min_interval: Duration) -> Self {
        Self {
            tolerance,
            min_interval,
        }
    }

    /// Translates a configuration, starting from [`DeltaPolicy::default`].
    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut policy = Self::default();
        policy.apply_config(config);
        policy
    }

    #[must_use]
    pub fn has_rate_constraint(&self) -> bool {
        !self.min_interval.is_zero()
    }

    /// The minimum interval in whole microseconds, saturating.
    #[must_use]
    pub fn min_interval_micros(&self) -> i64 {
        i64::try_from(self.min_interval.whole_microseconds()).unwrap_or(i64::MAX)
    }

    /// Applies `config` on top of this policy.
    ///
    /// The tolerance is always replaced. A zero (or negative) rate count
    /// clears the interval whatever the unit says. An unknown unit keeps the
    /// current interval.
    pub fn apply_config(&mut self, config: &FilterConfig) {
        self.tolerance = config.tolerance_percent();

        let count = config.min_rate_count();
        if count <= 0 {
            if count < 0 {
                warn_event!("Negative minimum rate {count} treated as no rate constraint");
            }
            self.min_interval = Duration::ZERO;
            return;
        }

        match config.rate_unit.parse::<RateUnit>() {
            Ok(unit) => self.min_interval = unit.interval(count),
            Err(err) => warn_event!(
                "{err}; keeping minimum interval of {}us",
                self.min_interval_micros()
            ),
        }
    }
}

/// Parses a JSON filter configuration.
pub fn parse_config(text: &str) -> Result<FilterConfig> {
    Ok(FilterConfig::from_json(text)?)
}
