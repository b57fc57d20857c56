// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector registry and fan-in scheduler.
//!
//! Collectors are registered once at startup into a [`Registry`]. [`Registry::run`] spawns one
//! task per selected collector, all writing into a single fan-in channel whose receiving half is
//! drained by the queuer. The channel holds a single slot, so a stalled consumer throttles every
//! producer equally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::constants::FAN_IN_CAPACITY;
use crate::datapoint::DataPoint;
use crate::errors::CollectorError;
use crate::factory::PointFactory;

/// An independently scheduled metric producer.
///
/// `run` is expected to loop forever at its own cadence. It must never close the sink, and
/// should return only if the sink is closed.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable name used by [`Registry::search`].
    fn name(&self) -> &str;

    /// One-time setup before the first run.
    fn init(&self) {}

    async fn run(&self, sink: mpsc::Sender<DataPoint>);
}

/// Both halves of the fan-in channel
pub struct FanIn {
    /// Clone this to publish points (restore path, self metrics)
    pub sender: mpsc::Sender<DataPoint>,
    pub receiver: mpsc::Receiver<DataPoint>,
}

#[derive(Default, Clone)]
pub struct Registry {
    collectors: Vec<Arc<dyn Collector>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: Collector + 'static>(&mut self, collector: C) {
        self.register_arc(Arc::new(collector));
    }

    pub fn register_arc(&mut self, collector: Arc<dyn Collector>) {
        debug!("Registered collector {}", collector.name());
        self.collectors.push(collector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Returns the collectors whose name contains at least one comma-separated `include`
    /// pattern and none of the non-empty `exclude` patterns, in registration order.
    ///
    /// Matching is case-sensitive substring containment. An empty `include` matches everything.
    #[must_use]
    pub fn search(&self, include: &str, exclude: &str) -> Vec<Arc<dyn Collector>> {
        self.collectors
            .iter()
            .filter(|c| {
                let name = c.name();
                let matches = include.split(',').any(|p| name.contains(p));
                let excluded = exclude
                    .split(',')
                    .any(|p| !p.is_empty() && name.contains(p));
                matches && !excluded
            })
            .cloned()
            .collect()
    }

    /// Starts `selection` (every registered collector when `None`) and returns the fan-in
    /// channel without waiting for any collector to produce.
    pub fn run(&self, selection: Option<Vec<Arc<dyn Collector>>>) -> FanIn {
        let selected = selection.unwrap_or_else(|| self.collectors.clone());
        let (sender, receiver) = mpsc::channel(FAN_IN_CAPACITY);
        for collector in selected {
            let sink = sender.clone();
            info!("Starting collector {}", collector.name());
            tokio::spawn(async move {
                collector.run(sink).await;
                debug!("Collector {} returned", collector.name());
            });
        }
        FanIn { sender, receiver }
    }
}

type CollectFn = dyn Fn(&PointFactory) -> Result<Vec<DataPoint>, CollectorError> + Send + Sync;

/// Collector that calls a sampling function every `interval` and publishes what it returns.
pub struct IntervalCollector {
    name: String,
    interval: Duration,
    factory: PointFactory,
    collect: Box<CollectFn>,
}

impl IntervalCollector {
    pub fn new<F>(name: impl Into<String>, interval: Duration, factory: PointFactory, collect: F) -> Self
    where
        F: Fn(&PointFactory) -> Result<Vec<DataPoint>, CollectorError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interval,
            factory,
            collect: Box::new(collect),
        }
    }

    /// Runs the sampling function once.
    pub fn sample(&self) -> Result<Vec<DataPoint>, CollectorError> {
        (self.collect)(&self.factory)
    }
}

#[async_trait]
impl Collector for IntervalCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, sink: mpsc::Sender<DataPoint>) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            let points = match self.sample() {
                Ok(points) => points,
                Err(e) => {
                    error!("{}: {}", self.name, e);
                    continue;
                }
            };
            for dp in points {
                if sink.send(dp).await.is_err() {
                    debug!("{}: sink closed", self.name);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::datapoint::TagSet;
    use crate::metadata::{NoopMetadata, RateType, Unit};
    use std::collections::HashSet;

    struct Named(&'static str);

    #[async_trait]
    impl Collector for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, sink: mpsc::Sender<DataPoint>) {
            let mut i = 0;
            loop {
                let dp = DataPoint::new(self.0, i, i, TagSet::new());
                if sink.send(dp).await.is_err() {
                    return;
                }
                i += 1;
            }
        }
    }

    fn registry(names: &[&'static str]) -> Registry {
        let mut registry = Registry::new();
        for name in names {
            registry.register(Named(name));
        }
        registry
    }

    fn names(found: &[Arc<dyn Collector>]) -> Vec<String> {
        found.iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn test_search_include_and_exclude() {
        let r = registry(&["c_cpu_linux", "c_meminfo_linux", "c_memcache", "c_ifstat", "c_cpu_info"]);
        assert_eq!(
            names(&r.search("cpu,mem", "memcache")),
            vec!["c_cpu_linux", "c_meminfo_linux", "c_cpu_info"]
        );
    }

    #[test]
    fn test_search_empty_patterns() {
        let r = registry(&["a", "b"]);
        assert_eq!(names(&r.search("", "")), vec!["a", "b"]);
        assert_eq!(names(&r.search("a", ",,")), vec!["a"]);
    }

    #[test]
    fn test_search_is_case_sensitive() {
        let r = registry(&["c_CPU", "c_cpu"]);
        assert_eq!(names(&r.search("cpu", "")), vec!["c_cpu"]);
    }

    #[tokio::test]
    async fn test_run_fans_in_every_collector() {
        let r = registry(&["one", "two", "three"]);
        let FanIn { sender, mut receiver } = r.run(None);
        drop(sender);

        let mut seen = HashSet::new();
        while seen.len() < 3 {
            let dp = receiver.recv().await.expect("point");
            seen.insert(dp.metric);
        }
        assert!(seen.contains("one") && seen.contains("two") && seen.contains("three"));
    }

    #[tokio::test]
    async fn test_run_selection_only() {
        let r = registry(&["keep", "skip"]);
        let mut fan_in = r.run(Some(r.search("keep", "")));

        for _ in 0..10 {
            let dp = fan_in.receiver.recv().await.expect("point");
            assert_eq!(dp.metric, "keep");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_collector_publishes_samples() {
        let factory = PointFactory::new(Clock::fixed(5), "h", TagSet::new(), Arc::new(NoopMetadata));
        let collector = IntervalCollector::new("c_test", Duration::from_secs(15), factory, |f| {
            let mut md = Vec::new();
            f.add(&mut md, "test.value", 1, None, RateType::Gauge, Unit::None, "");
            f.add(&mut md, "test.other", 2, None, RateType::Gauge, Unit::None, "");
            Ok(md)
        });
        assert_eq!(collector.sample().expect("sample").len(), 2);

        let mut r = Registry::new();
        r.register(collector);
        let mut fan_in = r.run(None);
        let first = fan_in.receiver.recv().await.expect("point");
        let second = fan_in.receiver.recv().await.expect("point");
        assert_eq!(first.metric, "test.value");
        assert_eq!(second.metric, "test.other");
        assert_eq!(second.tags.get("host"), Some("h"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_collector_survives_errors() {
        let factory = PointFactory::new(Clock::fixed(5), "h", TagSet::new(), Arc::new(NoopMetadata));
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let collector = IntervalCollector::new("c_flaky", Duration::from_secs(1), factory, move |_| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Err(CollectorError::Unavailable("first run".to_string()))
            } else {
                Ok(vec![DataPoint::new("flaky", 0, n as i64, TagSet::new())])
            }
        });

        let mut r = Registry::new();
        r.register(collector);
        let mut fan_in = r.run(None);
        let dp = fan_in.receiver.recv().await.expect("point");
        assert_eq!(dp.metric, "flaky");
        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }
}
