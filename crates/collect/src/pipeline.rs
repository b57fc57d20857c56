// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires the queuer, the batch sender, the PRTG mirror and the self metrics reporter around one
//! fan-in channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::collectors::FanIn;
use crate::config::Config;
use crate::factory::PointFactory;
use crate::flusher::{Flusher, FlusherConfig};
use crate::http::get_client;
use crate::prtg::{run_mirror_sender, PrtgPusher, PrtgSnapshot};
use crate::queue::{run_queuer, Queue};
use crate::self_metrics::{run_reporter, SelfMetrics};

pub struct Pipeline {
    config: Config,
    factory: PointFactory,
    queue: Arc<Queue>,
    self_metrics: Arc<SelfMetrics>,
    snapshot: Arc<PrtgSnapshot>,
    client: reqwest::Client,
}

impl Pipeline {
    pub fn new(config: Config, factory: PointFactory) -> Self {
        let client = get_client(&config);
        Self::with_client(config, factory, client)
    }

    pub fn with_client(config: Config, factory: PointFactory, client: reqwest::Client) -> Self {
        Self {
            queue: Arc::new(Queue::new(config.max_queue_len)),
            self_metrics: Arc::new(SelfMetrics::new()),
            snapshot: Arc::new(PrtgSnapshot::new()),
            config,
            factory,
            client,
        }
    }

    #[must_use]
    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    #[must_use]
    pub fn self_metrics(&self) -> Arc<SelfMetrics> {
        Arc::clone(&self.self_metrics)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<PrtgSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Spawns every pipeline task on the current runtime.
    ///
    /// The fan-in sender is kept by the batch sender (restore path) and the self metrics
    /// reporter, so the queuer runs until the returned handle is shut down.
    pub fn start(self, fan_in: FanIn) -> PipelineHandle {
        let FanIn { sender, receiver } = fan_in;
        let mut tasks = Vec::with_capacity(5);

        tasks.push(tokio::spawn(run_queuer(Arc::clone(&self.queue), receiver)));

        let (mirror_tx, mirror_rx) = mpsc::unbounded_channel();
        tasks.push(tokio::spawn(run_mirror_sender(
            self.snapshot.clone(),
            mirror_rx,
        )));

        let flusher = Flusher::new(FlusherConfig {
            queue: Arc::clone(&self.queue),
            client: self.client.clone(),
            endpoint: self.config.tsdb_url.clone().unwrap_or_default(),
            batch_size: self.config.batch_size,
            retry_strategy: self.config.retry_strategy,
            restore_tx: sender.clone(),
            mirror_tx: Some(mirror_tx),
            self_metrics: Arc::clone(&self.self_metrics),
            print: self.config.print,
        });
        tasks.push(tokio::spawn(flusher.run()));

        match &self.config.prtg_url {
            Some(url) => {
                let pusher = PrtgPusher::new(self.client.clone(), url.clone(), self.snapshot.clone());
                tasks.push(tokio::spawn(pusher.run(self.config.prtg_push_interval)));
            }
            None => debug!("No PRTG endpoint configured, mirror kept in memory only"),
        }

        tasks.push(tokio::spawn(run_reporter(
            Arc::clone(&self.self_metrics),
            Arc::clone(&self.queue),
            self.factory.clone(),
            sender,
            self.config.self_metrics_interval,
        )));

        info!(
            "Pipeline started: max queue length {}, batch size {}",
            self.config.max_queue_len, self.config.batch_size
        );

        PipelineHandle {
            queue: self.queue,
            self_metrics: self.self_metrics,
            snapshot: self.snapshot,
            tasks,
        }
    }
}

/// Running pipeline
pub struct PipelineHandle {
    queue: Arc<Queue>,
    self_metrics: Arc<SelfMetrics>,
    snapshot: Arc<PrtgSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    #[must_use]
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    #[must_use]
    pub fn self_metrics(&self) -> &Arc<SelfMetrics> {
        &self.self_metrics
    }

    #[must_use]
    pub fn snapshot(&self) -> &Arc<PrtgSnapshot> {
        &self.snapshot
    }

    /// Stops every pipeline task. Points still queued are lost.
    pub fn shutdown(self) {
        let queued = self.queue.len();
        for task in &self.tasks {
            task.abort();
        }
        info!("Pipeline stopped, {} points left in queue", queued);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::collectors::Registry;
    use crate::datapoint::{DataPoint, TagSet};
    use crate::metadata::NoopMetadata;
    use std::time::Duration;

    #[tokio::test]
    async fn test_print_mode_counts_as_sent() {
        let config = Config {
            print: true,
            ..Default::default()
        };
        let factory = PointFactory::new(Clock::fixed(1), "h", TagSet::new(), Arc::new(NoopMetadata));
        let fan_in = Registry::new().run(None);
        let tx = fan_in.sender.clone();
        let handle = Pipeline::new(config, factory).start(fan_in);

        for i in 0..3 {
            tx.send(DataPoint::new("print.me", i, i, TagSet::new()))
                .await
                .expect("send");
        }

        for _ in 0..100 {
            if handle.queue().counters().sent == 3 && handle.snapshot().get("print.me") == Some(2.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(handle.queue().counters().sent, 3);
        assert_eq!(handle.snapshot().get("print.me"), Some(2.0));
        handle.shutdown();
    }
}
