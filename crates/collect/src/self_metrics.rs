// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The agent's own delivery health, reported through the same pipeline as any other metric.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::constants::{DROPPED, QUEUED, SENT};
use crate::datapoint::DataPoint;
use crate::factory::PointFactory;
use crate::metadata::{RateType, Unit};
use crate::queue::Queue;

/// Monotonic counters keyed by metric name
#[derive(Debug, Default)]
pub struct SelfMetrics {
    counters: Mutex<BTreeMap<&'static str, i64>>,
}

impl SelfMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &'static str, value: i64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name).or_insert(0) += value;
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> i64 {
        self.counters
            .lock()
            .ok()
            .and_then(|c| c.get(name).copied())
            .unwrap_or_default()
    }

    /// Builds one point per counter plus queue gauges.
    #[must_use]
    pub fn points(&self, queue: &Queue, factory: &PointFactory) -> Vec<DataPoint> {
        let snapshot: Vec<(&'static str, i64)> = match self.counters.lock() {
            Ok(counters) => counters.iter().map(|(k, v)| (*k, *v)).collect(),
            Err(_) => Vec::new(),
        };

        let mut md = Vec::with_capacity(snapshot.len() + 3);
        for (name, value) in snapshot {
            factory.add(&mut md, name, value, None, RateType::Counter, Unit::None, "");
        }

        let counters = queue.counters();
        factory.add(
            &mut md,
            DROPPED,
            counters.dropped,
            None,
            RateType::Counter,
            Unit::Count,
            "Points discarded because the intake queue was full.",
        );
        factory.add(
            &mut md,
            SENT,
            counters.sent,
            None,
            RateType::Counter,
            Unit::Count,
            "Points accepted by the primary backend.",
        );
        factory.add(
            &mut md,
            QUEUED,
            queue.len(),
            None,
            RateType::Gauge,
            Unit::Count,
            "Points waiting in the intake queue.",
        );
        md
    }
}

/// Periodically pushes self metrics into the fan-in channel.
pub async fn run_reporter(
    metrics: Arc<SelfMetrics>,
    queue: Arc<Queue>,
    factory: PointFactory,
    tx: mpsc::Sender<DataPoint>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let points = metrics.points(&queue, &factory);
        debug!("Reporting {} self metrics", points.len());
        for dp in points {
            if tx.send(dp).await.is_err() {
                debug!("Fan-in channel closed, stopping self metrics reporter");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::constants::{POST_COUNT, POST_RESTORE};
    use crate::datapoint::{TagSet, Value};
    use crate::metadata::NoopMetadata;

    fn factory() -> PointFactory {
        PointFactory::new(Clock::fixed(100), "h", TagSet::new(), Arc::new(NoopMetadata))
    }

    fn find<'a>(points: &'a [DataPoint], name: &str) -> &'a DataPoint {
        points
            .iter()
            .find(|p| p.metric == name)
            .unwrap_or_else(|| panic!("missing {name}"))
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = SelfMetrics::new();
        metrics.add(POST_COUNT, 1);
        metrics.add(POST_COUNT, 1);
        metrics.add(POST_RESTORE, 7);
        assert_eq!(metrics.get(POST_COUNT), 2);
        assert_eq!(metrics.get(POST_RESTORE), 7);
        assert_eq!(metrics.get("collect.unknown"), 0);
    }

    #[test]
    fn test_points_include_queue_state() {
        let metrics = SelfMetrics::new();
        metrics.add(POST_COUNT, 3);
        let queue = Queue::new(1);
        queue.push(&DataPoint::new("a", 1, 1, TagSet::new()));
        queue.push(&DataPoint::new("b", 1, 1, TagSet::new()));

        let points = metrics.points(&queue, &factory());
        assert_eq!(find(&points, POST_COUNT).value, Value::Int(3));
        assert_eq!(find(&points, DROPPED).value, Value::Int(1));
        assert_eq!(find(&points, SENT).value, Value::Int(0));
        assert_eq!(find(&points, QUEUED).value, Value::Int(1));
        assert!(points.iter().all(|p| p.tags.get("host") == Some("h")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_sends_through_channel() {
        let metrics = Arc::new(SelfMetrics::new());
        let queue = Arc::new(Queue::new(10));
        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(run_reporter(
            metrics,
            queue,
            factory(),
            tx,
            Duration::from_secs(15),
        ));

        let first = rx.recv().await.expect("self metric");
        assert!(first.metric.starts_with("collect."));
        task.abort();
    }
}
