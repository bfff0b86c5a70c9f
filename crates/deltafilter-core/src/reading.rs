//! Readings and their data points.
//!
//! A [`Reading`] is one timestamped bundle of named values for an asset. On
//! the wire it is a JSON object:
//!
//! ```json
//! {"asset_code": "pump1", "user_ts": "2026-10-19T10:00:00Z", "readings": {"temp": 100.0}}
//! ```
//!
//! The key order of `readings` is the data point order. JSON integers become
//! [`DatapointValue::Integer`], all other numbers [`DatapointValue::Float`].

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Typed value of a data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatapointValue {
    Integer(i64),
    Float(f64),
    String(String),
    FloatArray(Vec<f64>),
}

impl DatapointValue {
    /// Short name of the variant, used in log output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::FloatArray(_) => "float_array",
        }
    }
}

impl From<i64> for DatapointValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for DatapointValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for DatapointValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DatapointValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for DatapointValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<f64>> for DatapointValue {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatArray(value)
    }
}

/// A named value within a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    name: String,
    value: DatapointValue,
}

impl Datapoint {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<DatapointValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &DatapointValue {
        &self.value
    }
}

/// One timestamped reading for an asset.
///
/// Data point names are unique within a reading; the builder methods replace
/// an existing point of the same name instead of adding a second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "asset_code")]
    asset: String,
    /// Timestamp assigned by the data source, not by the pipeline.
    #[serde(with = "time::serde::rfc3339")]
    user_ts: OffsetDateTime,
    #[serde(rename = "readings", with = "datapoint_map")]
    datapoints: Vec<Datapoint>,
}

impl Reading {
    #[must_use]
    pub fn new(asset: impl Into<String>, user_ts: OffsetDateTime) -> Self {
        Self {
            asset: asset.into(),
            user_ts,
            datapoints: Vec::new(),
        }
    }

    /// Builder form of [`Reading::set_datapoint`].
    #[must_use]
    pub fn with_datapoint(
        mut self,
        name: impl Into<String>,
        value: impl Into<DatapointValue>,
    ) -> Self {
        self.set_datapoint(name, value);
        self
    }

    /// Adds a data point, replacing the value of an existing point with the same name.
    pub fn set_datapoint(&mut self, name: impl Into<String>, value: impl Into<DatapointValue>) {
        let point = Datapoint::new(name, value);
        match self.datapoints.iter_mut().find(|p| p.name == point.name) {
            Some(existing) => existing.value = point.value,
            None => self.datapoints.push(point),
        }
    }

    #[must_use]
    pub fn asset(&self) -> &str {
        &self.asset
    }

    #[must_use]
    pub fn user_ts(&self) -> OffsetDateTime {
        self.user_ts
    }

    #[must_use]
    pub fn datapoints(&self) -> &[Datapoint] {
        &self.datapoints
    }

    /// Looks up a data point by name.
    #[must_use]
    pub fn datapoint(&self, name: &str) -> Option<&Datapoint> {
        self.datapoints.iter().find(|p| p.name == name)
    }

    /// Parses a single reading from its JSON wire form.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Serializes the ordered data points as a JSON object, keeping their order.
mod datapoint_map {
    use super::{Datapoint, DatapointValue};
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        points: &[Datapoint],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(points.len()))?;
        for point in points {
            map.serialize_entry(&point.name, &point.value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Datapoint>, D::Error> {
        deserializer.deserialize_map(DatapointsVisitor)
    }

    struct DatapointsVisitor;

    impl<'de> Visitor<'de> for DatapointsVisitor {
        type Value = Vec<Datapoint>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of data point names to integer, float, string or float array values")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut points: Vec<Datapoint> = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, value)) = access.next_entry::<String, DatapointValue>()? {
                if points.iter().any(|p| p.name == name) {
                    return Err(de::Error::custom(format!("duplicate data point `{name}`")));
                }
                points.push(Datapoint { name, value });
            }
            Ok(points)
        }
    }
}
