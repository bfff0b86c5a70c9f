//! Core types shared by the deltafilter crates.
//!
//! [`Reading`] and [`FilterConfig`] are the values a host pipeline hands to a
//! filter; [`Filter`] is the seam through which the host drives it.

pub mod config;
pub mod reading;

pub use config::FilterConfig;
pub use reading::{Datapoint, DatapointValue, Reading};

use serde_json::Value;

/// A stateful stage in a reading pipeline.
///
/// Implementations take `&self` so the data plane (`ingest`) and the control
/// plane (`reconfigure`) can share one instance across threads.
pub trait Filter {
    /// Consumes a batch and returns the readings to pass downstream, in input order.
    fn ingest(&self, readings: Vec<Reading>) -> Vec<Reading>;
    /// Applies a new configuration to the live filter.
    fn reconfigure(&self, config: &FilterConfig);
    /// Diagnostic view of the filter state.
    fn snapshot(&self) -> Value;
}
