// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builds fully tagged, timestamped data points for collectors.

use std::sync::Arc;

use crate::clock::Clock;
use crate::constants::HOST_TAG;
use crate::datapoint::{DataPoint, TagSet, Value};
use crate::metadata::{MetadataKind, MetadataRecorder, RateType, Unit};

/// Shared by every collector. Cheap to clone.
#[derive(Clone)]
pub struct PointFactory {
    clock: Clock,
    hostname: String,
    global_tags: TagSet,
    metadata: Arc<dyn MetadataRecorder>,
}

impl PointFactory {
    pub fn new(
        clock: Clock,
        hostname: impl Into<String>,
        global_tags: TagSet,
        metadata: Arc<dyn MetadataRecorder>,
    ) -> Self {
        Self {
            clock,
            hostname: hostname.into(),
            global_tags,
            metadata,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn global_tags(&self) -> &TagSet {
        &self.global_tags
    }

    /// Appends a point stamped with the cached clock to `md`.
    ///
    /// `tags` may be `None`. A missing `host` tag is filled with the local hostname; a `host` tag
    /// set to the empty string is removed, which is how a collector opts out of host tagging.
    /// Global tags are applied underneath the caller's tags, so the caller wins on collisions.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        md: &mut Vec<DataPoint>,
        name: &str,
        value: impl Into<Value>,
        tags: Option<&TagSet>,
        rate: RateType,
        unit: Unit,
        desc: &str,
    ) {
        self.add_ts(md, name, self.clock.now(), value, tags, rate, unit, desc);
    }

    /// Same as [`PointFactory::add`] with an explicit timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn add_ts(
        &self,
        md: &mut Vec<DataPoint>,
        name: &str,
        ts: i64,
        value: impl Into<Value>,
        tags: Option<&TagSet>,
        rate: RateType,
        unit: Unit,
        desc: &str,
    ) {
        md.push(self.build(name, ts, value.into(), tags, rate, unit, desc));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        name: &str,
        ts: i64,
        value: Value,
        tags: Option<&TagSet>,
        rate: RateType,
        unit: Unit,
        desc: &str,
    ) -> DataPoint {
        let mut tags = tags.cloned().unwrap_or_default();

        if rate != RateType::Unknown {
            self.metadata
                .add_meta(name, None, MetadataKind::Rate, &rate.to_string());
        }
        if unit != Unit::None {
            self.metadata
                .add_meta(name, None, MetadataKind::Unit, &unit.to_string());
        }
        if !desc.is_empty() {
            self.metadata
                .add_meta(name, Some(&tags), MetadataKind::Desc, desc);
        }

        let suppress_host = match tags.get(HOST_TAG) {
            None => {
                tags.insert(HOST_TAG, self.hostname.clone());
                false
            }
            Some("") => true,
            Some(_) => false,
        };

        let mut tags = self.global_tags.clone().merge(&tags);
        if suppress_host {
            tags.remove(HOST_TAG);
        }

        DataPoint {
            metric: name.to_string(),
            timestamp: ts,
            value,
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadata;

    fn factory(global: &str, md: Arc<InMemoryMetadata>) -> PointFactory {
        PointFactory::new(
            Clock::fixed(1_700_000_000),
            "web01",
            TagSet::parse(global).expect("tags"),
            md,
        )
    }

    #[test]
    fn test_empty_tags_get_host() {
        let f = factory("", Arc::new(InMemoryMetadata::new()));
        let mut md = Vec::new();
        f.add(&mut md, "os.cpu", 1.5, Some(&TagSet::new()), RateType::Gauge, Unit::Pct, "");

        assert_eq!(md.len(), 1);
        assert_eq!(md[0].tags.get("host"), Some("web01"));
        assert_eq!(md[0].timestamp, 1_700_000_000);
        assert_eq!(md[0].value, Value::Float(1.5));
    }

    #[test]
    fn test_empty_host_is_suppressed() {
        let f = factory("host=global-host,dc=ny", Arc::new(InMemoryMetadata::new()));
        let mut md = Vec::new();
        let tags = TagSet::parse("host=").expect("tags");
        f.add(&mut md, "app.hits", 3, Some(&tags), RateType::Counter, Unit::Count, "");

        assert!(!md[0].tags.contains_key("host"));
        assert_eq!(md[0].tags.get("dc"), Some("ny"));
    }

    #[test]
    fn test_caller_tags_win_over_global_tags() {
        let f = factory("env=prod,dc=ny", Arc::new(InMemoryMetadata::new()));
        let mut md = Vec::new();
        let tags = TagSet::parse("env=staging,host=db02").expect("tags");
        f.add(&mut md, "os.mem.free", 1024_u64, Some(&tags), RateType::Gauge, Unit::Bytes, "");

        let out = &md[0].tags;
        assert_eq!(out.get("env"), Some("staging"));
        assert_eq!(out.get("dc"), Some("ny"));
        assert_eq!(out.get("host"), Some("db02"));
    }

    #[test]
    fn test_add_ts_overrides_clock() {
        let f = factory("", Arc::new(InMemoryMetadata::new()));
        let mut md = Vec::new();
        f.add_ts(&mut md, "os.system.uptime", 12, 99, None, RateType::Gauge, Unit::Second, "");
        assert_eq!(md[0].timestamp, 12);
    }

    #[test]
    fn test_metadata_is_recorded() {
        let meta = Arc::new(InMemoryMetadata::new());
        let f = factory("", Arc::clone(&meta));
        let mut md = Vec::new();
        for _ in 0..3 {
            f.add(
                &mut md,
                "os.mem.free",
                1,
                None,
                RateType::Gauge,
                Unit::Bytes,
                "Free memory",
            );
        }

        assert_eq!(md.len(), 3);
        assert_eq!(meta.len(), 3);
        assert_eq!(
            meta.get("os.mem.free", None, MetadataKind::Rate).as_deref(),
            Some("gauge")
        );
        assert_eq!(
            meta.get("os.mem.free", Some(&TagSet::new()), MetadataKind::Desc)
                .as_deref(),
            Some("Free memory")
        );
    }

    #[test]
    fn test_unknown_rate_and_no_unit_record_nothing() {
        let meta = Arc::new(InMemoryMetadata::new());
        let f = factory("", Arc::clone(&meta));
        let mut md = Vec::new();
        f.add(&mut md, "x", 1, None, RateType::Unknown, Unit::None, "");
        assert!(meta.is_empty());
    }
}
