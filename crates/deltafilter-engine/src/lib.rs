#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Per-asset delta detection for reading streams.
//!
//! The [`DeltaEngine`] remembers the last reading it forwarded for every
//! asset and lets a new reading through only when one of its values moved
//! outside the configured tolerance, or when the source has been quiet for
//! longer than the minimum forwarding interval. Everything else is dropped.
//!
//! Time is always taken from the readings themselves, never from the clock,
//! because the rate check models the sampling cadence of the source.

// Logging goes through `tracing` when the `telemetry` feature is on.
macro_rules! warn_event {
    ($($arg:tt)*) => {{
        #[cfg(feature = "telemetry")]
        tracing::warn!($($arg)*);
        #[cfg(not(feature = "telemetry"))]
        eprintln!($($arg)*);
    }};
}

macro_rules! debug_event {
    ($($arg:tt)*) => {{
        #[cfg(feature = "telemetry")]
        tracing::debug!($($arg)*);
    }};
}

mod engine;
pub mod error;
mod policy;
mod state;

pub use engine::DeltaEngine;
pub use error::{FilterError, Result};
pub use policy::{parse_config, DeltaPolicy, RateUnit};
pub use state::AssetState;
