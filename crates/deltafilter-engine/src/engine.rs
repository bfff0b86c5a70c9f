//! Batch orchestration over the per-asset state table.

use crate::policy::DeltaPolicy;
use crate::state::AssetState;
use deltafilter_core::{Filter, FilterConfig, Reading};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Default)]
struct Inner {
    policy: DeltaPolicy,
    assets: HashMap<String, AssetState>,
}

/// Filters batches of readings down to the ones that carry news.
///
/// Policy and state table sit behind one lock, so [`DeltaEngine::process`]
/// and [`DeltaEngine::reconfigure`] may be called from different threads
/// through an `Arc<DeltaEngine>`. A batch always runs under a single policy.
/// The state table is never pruned.
#[derive(Debug, Default)]
pub struct DeltaEngine {
    inner: Mutex<Inner>,
}

impl DeltaEngine {
    #[must_use]
    pub fn new(policy: DeltaPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                policy,
                assets: HashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(DeltaPolicy::from_config(config))
    }

    /// Consumes `readings` and returns the forwarded subset in input order.
    ///
    /// The first reading of an unknown asset is always forwarded and seeds
    /// its state. Later readings are forwarded iff
    /// [`AssetState::evaluate`] says so; the rest are dropped.
    pub fn process(&self, readings: Vec<Reading>) -> Vec<Reading> {
        let received = readings.len();
        let mut inner = self.inner.lock();
        let Inner { policy, assets } = &mut *inner;

        let mut forwarded = Vec::with_capacity(received);
        for reading in readings {
            let send = match assets.get_mut(reading.asset()) {
                Some(state) => state.evaluate(&reading),
                None => {
                    debug_event!(asset = reading.asset(), "first reading for asset");
                    assets.insert(
                        reading.asset().to_owned(),
                        AssetState::new(&reading, *policy),
                    );
                    true
                }
            };
            if send {
                forwarded.push(reading);
            }
        }

        debug_event!(
            received,
            forwarded = forwarded.len(),
            dropped = received - forwarded.len(),
            assets = assets.len(),
            "processed batch"
        );
        forwarded
    }

    /// Translates `config` and applies it to the engine and every known asset.
    ///
    /// Retained readings and timestamps are kept.
    pub fn reconfigure(&self, config: &FilterConfig) {
        let mut inner = self.inner.lock();
        let mut policy = inner.policy;
        policy.apply_config(config);
        Self::propagate(&mut inner, policy);
    }

    /// Replaces the policy of the engine and every known asset.
    pub fn set_policy(&self, policy: DeltaPolicy) {
        Self::propagate(&mut self.inner.lock(), policy);
    }

    fn propagate(inner: &mut Inner, policy: DeltaPolicy) {
        inner.policy = policy;
        for state in inner.assets.values_mut() {
            state.reconfigure(policy);
        }
        debug_event!(
            tolerance = policy.tolerance,
            min_interval_us = policy.min_interval_micros(),
            assets = inner.assets.len(),
            "policy updated"
        );
    }

    #[must_use]
    pub fn policy(&self) -> DeltaPolicy {
        self.inner.lock().policy
    }

    /// Number of distinct assets seen so far.
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.inner.lock().assets.len()
    }

    /// The last reading forwarded for `asset`.
    #[must_use]
    pub fn last_sent(&self, asset: &str) -> Option<Reading> {
        self.inner
            .lock()
            .assets
            .get(asset)
            .map(|state| state.last_sent().clone())
    }

    /// Policy plus the last forwarded timestamp of every asset, as JSON.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.lock();
        let assets: BTreeMap<&str, Value> = inner
            .assets
            .iter()
            .map(|(asset, state)| {
                (
                    asset.as_str(),
                    json!({
                        "last_sent_time": format_ts(state.last_sent_time()),
                        "datapoints": state.last_sent().datapoints().len(),
                    }),
                )
            })
            .collect();
        json!({
            "tolerance": inner.policy.tolerance,
            "min_interval_us": inner.policy.min_interval_micros(),
            "assets": assets,
        })
    }
}

impl Filter for DeltaEngine {
    fn ingest(&self, readings: Vec<Reading>) -> Vec<Reading> {
        self.process(readings)
    }

    fn reconfigure(&self, config: &FilterConfig) {
        DeltaEngine::reconfigure(self, config);
    }

    fn snapshot(&self) -> Value {
        DeltaEngine::snapshot(self)
    }
}

fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}
