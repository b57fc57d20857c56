// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch sender for the primary backend.
//!
//! Each cycle drains at most `batch_size` entries from the intake queue and the mirror buffer,
//! hands the mirror half to the mirror sender and posts the intake half as a gzipped JSON array.
//! Only `204 No Content` counts as delivered. On any other outcome the batch is decoded back into
//! points and re-published on the fan-in channel, where it competes with fresh data for queue
//! space, and the sender waits for the retry strategy's delay before draining again.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::constants::{
    IDLE_POLL_INTERVAL, POST_BAD_STATUS, POST_COUNT, POST_ERROR, POST_RESTORE, POST_TOTAL_DURATION,
};
use crate::datapoint::DataPoint;
use crate::prtg::PrtgResult;
use crate::queue::{Batch, Queue};
use crate::retry::RetryStrategy;
use crate::self_metrics::SelfMetrics;

#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("failed to prepare payload: {0}")]
    Payload(#[from] std::io::Error),

    #[error("failed to reach backend: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {0}: {1}")]
    Status(StatusCode, String),
}

/// Result of one drain-and-deliver cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty.
    Idle,
    /// Backend acknowledged the batch.
    Sent(usize),
    /// Dry run: the batch was logged.
    Printed(usize),
    /// Payload could not be built, the batch is gone.
    Dropped(usize),
    /// Delivery failed; `restored` points went back to the fan-in channel.
    Restored { restored: usize, backoff: Duration },
}

pub struct FlusherConfig {
    pub queue: Arc<Queue>,
    pub client: reqwest::Client,
    pub endpoint: String,
    pub batch_size: usize,
    pub retry_strategy: RetryStrategy,
    /// Fan-in sender used to re-inject failed batches
    pub restore_tx: mpsc::Sender<DataPoint>,
    /// Drained mirror batches, `None` when nothing consumes them
    pub mirror_tx: Option<mpsc::UnboundedSender<Vec<PrtgResult>>>,
    pub self_metrics: Arc<SelfMetrics>,
    pub print: bool,
}

pub struct Flusher {
    queue: Arc<Queue>,
    client: reqwest::Client,
    endpoint: String,
    batch_size: usize,
    retry_strategy: RetryStrategy,
    restore_tx: mpsc::Sender<DataPoint>,
    mirror_tx: Option<mpsc::UnboundedSender<Vec<PrtgResult>>>,
    self_metrics: Arc<SelfMetrics>,
    print: bool,
    consecutive_failures: u32,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            queue: config.queue,
            client: config.client,
            endpoint: config.endpoint,
            batch_size: config.batch_size,
            retry_strategy: config.retry_strategy,
            restore_tx: config.restore_tx,
            mirror_tx: config.mirror_tx,
            self_metrics: config.self_metrics,
            print: config.print,
            consecutive_failures: 0,
        }
    }

    /// Runs forever: poll every second while idle, back off after a failed delivery.
    pub async fn run(mut self) {
        info!(
            "Batch sender started, endpoint: {}, batch size: {}",
            if self.print { "<print>" } else { self.endpoint.as_str() },
            self.batch_size
        );
        loop {
            match self.flush_once().await {
                FlushOutcome::Idle => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                FlushOutcome::Restored { backoff, .. } => tokio::time::sleep(backoff).await,
                _ => {}
            }
        }
    }

    /// Drains one batch and delivers it. The queue lock is released before any I/O.
    pub async fn flush_once(&mut self) -> FlushOutcome {
        let Some(Batch { points, mirror }) = self.queue.drain(self.batch_size) else {
            return FlushOutcome::Idle;
        };

        if let Some(mirror_tx) = &self.mirror_tx {
            if mirror_tx.send(mirror).is_err() {
                debug!("Mirror sender is gone, discarding mirror batch");
            }
        }

        self.send_batch(points).await
    }

    pub async fn send_batch(&mut self, batch: Vec<Vec<u8>>) -> FlushOutcome {
        let n = batch.len();
        if self.print {
            for raw in &batch {
                info!("{}", String::from_utf8_lossy(raw));
            }
            self.record_sent(n);
            return FlushOutcome::Printed(n);
        }

        match self.ship(&batch).await {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.record_sent(n);
                FlushOutcome::Sent(n)
            }
            Err(ShippingError::Payload(e)) => {
                error!("Failed to prepare payload. Data dropped: {}", e);
                FlushOutcome::Dropped(n)
            }
            Err(e) => {
                match &e {
                    ShippingError::Transport(_) => self.self_metrics.add(POST_ERROR, 1),
                    ShippingError::Status(..) => self.self_metrics.add(POST_BAD_STATUS, 1),
                    ShippingError::Payload(_) => {}
                }
                error!("{}", e);

                let restored = self.restore(&batch).await;
                self.self_metrics.add(POST_RESTORE, restored as i64);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let backoff = self.retry_strategy.delay(self.consecutive_failures);
                info!("restored {}, sleeping {:?}", restored, backoff);
                FlushOutcome::Restored { restored, backoff }
            }
        }
    }

    async fn ship(&self, batch: &[Vec<u8>]) -> Result<(), ShippingError> {
        let body = encode_batch(batch)?;

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body)
            .send()
            .await;
        let elapsed = start.elapsed();
        self.self_metrics
            .add(POST_TOTAL_DURATION, elapsed.as_millis() as i64);
        self.self_metrics.add(POST_COUNT, 1);

        let resp = resp?;
        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to read response body: {}", e);
                String::new()
            }
        };
        Err(ShippingError::Status(status, body))
    }

    /// Decodes a failed batch and publishes every point on the fan-in channel again.
    ///
    /// Malformed entries are logged and skipped. Returns the number of points re-published.
    async fn restore(&self, batch: &[Vec<u8>]) -> usize {
        let mut restored = 0;
        for (i, raw) in batch.iter().enumerate() {
            let dp = match DataPoint::from_json(raw) {
                Ok(dp) => dp,
                Err(e) => {
                    error!("Failed to restore point: {}", e);
                    continue;
                }
            };
            if self.restore_tx.send(dp).await.is_err() {
                error!("Fan-in channel closed, {} points not restored", batch.len() - i);
                break;
            }
            restored += 1;
        }
        restored
    }

    fn record_sent(&self, n: usize) {
        debug!("sent {}", n);
        self.queue.record_sent(n as u64);
    }
}

/// Gzips the serialized points as one JSON array.
pub fn encode_batch(batch: &[Vec<u8>]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"[")?;
    for (i, raw) in batch.iter().enumerate() {
        if i > 0 {
            encoder.write_all(b",")?;
        }
        encoder.write_all(raw)?;
    }
    encoder.write_all(b"]")?;
    encoder.finish()
}
