// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data point model shared by collectors and the delivery pipeline.
//!
//! A [`DataPoint`] is serialized to the primary backend as
//! `{"metric":"os.cpu","timestamp":1700000000,"value":42.5,"tags":{"host":"web01"}}`.
//! Tags are kept in a sorted map so the JSON encoding of a point is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::SerializationError;

/// Ordered set of `key=value` tags. Keys are unique within a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parses a comma-separated `key=value` list, e.g. `dc=ny,role=web`.
    ///
    /// Empty segments are skipped; a segment without `=` or with an empty key is rejected.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut tags = TagSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => {
                    tags.insert(k.trim(), v.trim());
                }
                _ => return Err(format!("invalid tag '{part}', expected key=value")),
            }
        }
        Ok(tags)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copies every tag of `other` into `self`, overwriting keys present in both.
    #[must_use]
    pub fn merge(mut self, other: &TagSet) -> Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Observed value. Numbers are the common case; strings are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric projection used by the PRTG mirror.
    ///
    /// Lossy: text that does not parse as a float becomes `0.0`, and integers beyond 2^53 lose
    /// precision.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One timestamped, tagged observation of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,
    pub timestamp: i64,
    pub value: Value,
    #[serde(default)]
    pub tags: TagSet,
}

impl DataPoint {
    pub fn new(metric: impl Into<String>, timestamp: i64, value: impl Into<Value>, tags: TagSet) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value: value.into(),
            tags,
        }
    }

    /// Encodes the point as the JSON object queued for the primary backend.
    ///
    /// Points with an empty metric name or a NaN/infinite value are rejected rather than
    /// silently encoded as `null`.
    pub fn to_json(&self) -> Result<Vec<u8>, SerializationError> {
        if self.metric.is_empty() {
            return Err(SerializationError::EmptyMetric);
        }
        if let Value::Float(f) = self.value {
            if !f.is_finite() {
                return Err(SerializationError::NonFinite(self.metric.clone()));
            }
        }
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, SerializationError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Time series identity: metric name plus tag set.
    #[must_use]
    pub fn series_key(&self) -> String {
        format!("{}{{{}}}", self.metric, self.tags)
    }
}
