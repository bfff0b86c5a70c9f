//! What the engine remembers about a single asset.

use crate::policy::DeltaPolicy;
use deltafilter_core::{DatapointValue, Reading};
use time::OffsetDateTime;

/// The last forwarded reading of one asset and the policy it is judged by.
#[derive(Debug, Clone)]
pub struct AssetState {
    last_sent: Reading,
    last_sent_time: OffsetDateTime,
    policy: DeltaPolicy,
}

impl AssetState {
    /// Seeds the state with the first reading seen for an asset.
    #[must_use]
    pub fn new(first: &Reading, policy: DeltaPolicy) -> Self {
        Self {
            last_sent: first.clone(),
            last_sent_time: first.user_ts(),
            policy,
        }
    }

    #[must_use]
    pub fn asset(&self) -> &str {
        self.last_sent.asset()
    }

    #[must_use]
    pub fn last_sent(&self) -> &Reading {
        &self.last_sent
    }

    #[must_use]
    pub fn last_sent_time(&self) -> OffsetDateTime {
        self.last_sent_time
    }

    #[must_use]
    pub fn policy(&self) -> DeltaPolicy {
        self.policy
    }

    /// Replaces the policy. The retained reading is kept.
    pub fn reconfigure(&mut self, policy: DeltaPolicy) {
        self.policy = policy;
    }

    /// Decides whether `candidate` must be forwarded.
    ///
    /// A reading is forwarded when its timestamp lies beyond the last
    /// forwarded one plus the minimum interval, or when any data point moved
    /// outside the tolerance of its same-named, same-typed predecessor. A
    /// forwarded reading becomes the new baseline; a dropped one leaves the
    /// state untouched.
    ///
    /// # Panics
    ///
    /// If `candidate` belongs to another asset.
    pub fn evaluate(&mut self, candidate: &Reading) -> bool {
        assert_eq!(
            candidate.asset(),
            self.asset(),
            "reading routed to the wrong asset state"
        );

        let send = self.rate_due(candidate) || self.exceeds_tolerance(candidate);
        if send {
            self.last_sent = candidate.clone();
            self.last_sent_time = candidate.user_ts();
        }
        send
    }

    fn rate_due(&self, candidate: &Reading) -> bool {
        if !self.policy.has_rate_constraint() {
            return false;
        }
        self.last_sent_time
            .checked_add(self.policy.min_interval)
            .is_some_and(|deadline| candidate.user_ts() > deadline)
    }

    fn exceeds_tolerance(&self, candidate: &Reading) -> bool {
        candidate.datapoints().iter().any(|point| {
            self.last_sent
                .datapoint(point.name())
                .is_some_and(|previous| {
                    significant_change(previous.value(), point.value(), self.policy.tolerance)
                })
        })
    }
}

/// Compares two values of the same data point.
///
/// The old value is the base of the percentage, so a zero old value makes any
/// difference significant. Values of different types carry no signal.
fn significant_change(old: &DatapointValue, new: &DatapointValue, tolerance: f64) -> bool {
    match (old, new) {
        (DatapointValue::Integer(old), DatapointValue::Integer(new)) => {
            #[allow(clippy::cast_precision_loss)]
            let (delta, base) = (new.abs_diff(*old) as f64, old.unsigned_abs() as f64);
            delta > tolerance * base / 100.0
        }
        (DatapointValue::Float(old), DatapointValue::Float(new)) => {
            (new - old).abs() > tolerance * old.abs() / 100.0
        }
        (DatapointValue::String(old), DatapointValue::String(new)) => old != new,
        // arrays are not compared
        (DatapointValue::FloatArray(_), DatapointValue::FloatArray(_)) => false,
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2026-10-19 10:00:00 UTC);

    fn int(v: i64) -> DatapointValue {
        DatapointValue::Integer(v)
    }

    fn float(v: f64) -> DatapointValue {
        DatapointValue::Float(v)
    }

    fn text(v: &str) -> DatapointValue {
        DatapointValue::String(v.to_owned())
    }

    fn reading(ts: OffsetDateTime, temp: f64) -> Reading {
        Reading::new("pump1", ts).with_datapoint("temp", temp)
    }

    #[test]
    fn integer_threshold_uses_old_value() {
        // 10% of 100 is 10
        assert!(!significant_change(&int(100), &int(110), 10.0));
        assert!(!significant_change(&int(100), &int(90), 10.0));
        assert!(significant_change(&int(100), &int(89), 10.0));
        // 10% of the new value would be 11.1
        assert!(significant_change(&int(100), &int(111), 10.0));
    }

    #[test]
    fn zero_old_value_makes_any_change_significant() {
        assert!(significant_change(&int(0), &int(1), 50.0));
        assert!(!significant_change(&int(0), &int(0), 50.0));
        assert!(significant_change(&float(0.0), &float(1e-9), 50.0));
        assert!(!significant_change(&float(0.0), &float(0.0), 50.0));
    }

    #[test]
    fn negative_values_use_magnitude() {
        assert!(!significant_change(&int(-100), &int(-105), 10.0));
        assert!(significant_change(&int(-100), &int(-111), 10.0));
        assert!(!significant_change(&float(-100.0), &float(-100.0), 10.0));
    }

    #[test]
    fn integer_extremes_do_not_overflow() {
        assert!(significant_change(&int(i64::MIN), &int(i64::MAX), 10.0));
    }

    #[test]
    fn strings_compare_exactly() {
        assert!(!significant_change(&text("on"), &text("on"), 100.0));
        assert!(significant_change(&text("on"), &text("On"), 100.0));
    }

    #[test]
    fn arrays_and_mixed_types_carry_no_signal() {
        let before = DatapointValue::FloatArray(vec![1.0]);
        let after = DatapointValue::FloatArray(vec![9.0, 9.0]);
        assert!(!significant_change(&before, &after, 0.0));
        assert!(!significant_change(&int(1), &float(1000.0), 0.0));
        assert!(!significant_change(&text("1"), &int(1), 0.0));
    }

    #[test]
    fn dropped_reading_leaves_state_untouched() {
        let policy = DeltaPolicy::new(10.0, Duration::ZERO);
        let mut state = AssetState::new(&reading(T0, 100.0), policy);
        let later = T0 + Duration::seconds(5);

        assert!(!state.evaluate(&reading(later, 105.0)));
        assert_eq!(state.last_sent_time(), T0);
        assert_eq!(state.last_sent(), &reading(T0, 100.0));
    }

    #[test]
    fn forwarded_reading_becomes_baseline() {
        let policy = DeltaPolicy::new(10.0, Duration::ZERO);
        let mut state = AssetState::new(&reading(T0, 100.0), policy);
        let later = T0 + Duration::seconds(5);

        assert!(state.evaluate(&reading(later, 112.0)));
        assert_eq!(state.last_sent_time(), later);
        assert_eq!(state.last_sent(), &reading(later, 112.0));
    }

    #[test]
    fn rate_deadline_is_strict() {
        let policy = DeltaPolicy::new(10.0, Duration::seconds(30));
        let mut state = AssetState::new(&reading(T0, 100.0), policy);

        assert!(!state.evaluate(&reading(T0 + Duration::seconds(30), 100.0)));
        assert!(state.evaluate(&reading(T0 + Duration::seconds(31), 100.0)));
        assert_eq!(state.last_sent_time(), T0 + Duration::seconds(31));
    }

    #[test]
    fn reconfigure_keeps_baseline() {
        let policy = DeltaPolicy::new(10.0, Duration::ZERO);
        let mut state = AssetState::new(&reading(T0, 100.0), policy);
        state.reconfigure(DeltaPolicy::new(1.0, Duration::ZERO));

        assert_eq!(state.policy().tolerance, 1.0);
        assert_eq!(state.last_sent_time(), T0);
        assert!(state.evaluate(&reading(T0 + Duration::seconds(1), 102.0)));
    }

    #[test]
    #[should_panic(expected = "reading routed to the wrong asset state")]
    fn foreign_asset_is_a_programming_error() {
        let mut state = AssetState::new(&reading(T0, 1.0), DeltaPolicy::default());
        state.evaluate(&Reading::new("pump2", T0).with_datapoint("temp", 1.0));
    }
}
