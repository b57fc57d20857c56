// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric metadata: rate type, unit and description.
//!
//! Point construction registers metadata as a side effect. The pipeline only depends on the
//! [`MetadataRecorder`] contract; registration must be idempotent so collectors can call it on
//! every sample.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tracing::debug;

use crate::datapoint::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateType {
    Unknown,
    Gauge,
    Counter,
    Rate,
}

impl fmt::Display for RateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateType::Unknown => "",
            RateType::Gauge => "gauge",
            RateType::Counter => "counter",
            RateType::Rate => "rate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    None,
    Bytes,
    BytesPerSecond,
    Count,
    Megahertz,
    MilliSecond,
    Nanocores,
    Operation,
    Packet,
    Pct,
    Second,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::None => "",
            Unit::Bytes => "bytes",
            Unit::BytesPerSecond => "bytes per second",
            Unit::Count => "count",
            Unit::Megahertz => "MHz",
            Unit::MilliSecond => "milliseconds",
            Unit::Nanocores => "nanocores",
            Unit::Operation => "operations",
            Unit::Packet => "packets",
            Unit::Pct => "percent",
            Unit::Second => "seconds",
        };
        f.write_str(s)
    }
}

/// The kind of metadata attached to a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Rate,
    Unit,
    Desc,
}

impl MetadataKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::Rate => "rate",
            MetadataKind::Unit => "unit",
            MetadataKind::Desc => "desc",
        }
    }
}

pub trait MetadataRecorder: Send + Sync {
    /// Records `value` for `(metric, tags, kind)`. Repeating an identical call is a no-op.
    fn add_meta(&self, metric: &str, tags: Option<&TagSet>, kind: MetadataKind, value: &str);
}

/// Recorder that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetadata;

impl MetadataRecorder for NoopMetadata {
    fn add_meta(&self, _metric: &str, _tags: Option<&TagSet>, _kind: MetadataKind, _value: &str) {}
}

type MetaKey = (String, String, MetadataKind);

/// Process-local metadata store keyed by metric, tag set and kind
#[derive(Debug, Default)]
pub struct InMemoryMetadata {
    entries: Mutex<HashMap<MetaKey, String>>,
}

impl InMemoryMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, metric: &str, tags: Option<&TagSet>, kind: MetadataKind) -> Option<String> {
        let key = key(metric, tags, kind);
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataRecorder for InMemoryMetadata {
    fn add_meta(&self, metric: &str, tags: Option<&TagSet>, kind: MetadataKind, value: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let key = key(metric, tags, kind);
        if entries.get(&key).map(String::as_str) == Some(value) {
            return;
        }
        debug!("metadata {} {} = {}", metric, kind.as_str(), value);
        entries.insert(key, value.to_string());
    }
}

fn key(metric: &str, tags: Option<&TagSet>, kind: MetadataKind) -> MetaKey {
    (
        metric.to_string(),
        tags.map(ToString::to_string).unwrap_or_default(),
        kind,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_meta_is_idempotent() {
        let md = InMemoryMetadata::new();
        md.add_meta("os.mem.free", None, MetadataKind::Unit, "bytes");
        md.add_meta("os.mem.free", None, MetadataKind::Unit, "bytes");
        assert_eq!(md.len(), 1);
        assert_eq!(
            md.get("os.mem.free", None, MetadataKind::Unit).as_deref(),
            Some("bytes")
        );
    }

    #[test]
    fn test_tags_partition_entries() {
        let md = InMemoryMetadata::new();
        let tags = TagSet::parse("iface=eth0").expect("tags");
        md.add_meta("os.net.bytes", Some(&tags), MetadataKind::Desc, "per adapter");
        md.add_meta("os.net.bytes", None, MetadataKind::Desc, "global");
        assert_eq!(md.len(), 2);
        assert_eq!(
            md.get("os.net.bytes", Some(&tags), MetadataKind::Desc).as_deref(),
            Some("per adapter")
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(RateType::Counter.to_string(), "counter");
        assert_eq!(Unit::Megahertz.to_string(), "MHz");
        assert_eq!(Unit::None.to_string(), "");
    }
}
