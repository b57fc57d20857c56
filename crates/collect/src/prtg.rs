// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mirror path to a PRTG push sensor.
//!
//! Every accepted point also lands in the mirror buffer as a `(channel, value)` pair. The mirror
//! sender folds drained batches into a [`PrtgSnapshot`] (last write wins per channel) and the
//! pusher periodically posts the whole snapshot as an XML document:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <prtg><result><channel>os.cpu</channel><value>12.5</value></result></prtg>
//! ```
//!
//! The mirror is fire-and-forget: nothing is retried, a missed value is superseded by the next
//! snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::datapoint::DataPoint;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, thiserror::Error)]
pub enum PrtgError {
    #[error("failed to render xml: {0}")]
    Render(#[from] quick_xml::DeError),

    #[error("failed to push to PRTG: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Reduced projection of a data point for PRTG
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrtgResult {
    pub channel: String,
    pub value: f64,
}

impl PrtgResult {
    pub fn new(channel: impl Into<String>, value: f64) -> Self {
        Self {
            channel: channel.into(),
            value,
        }
    }
}

impl From<&DataPoint> for PrtgResult {
    fn from(dp: &DataPoint) -> Self {
        Self::new(dp.metric.clone(), dp.value.as_f64())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "prtg")]
struct PrtgDocument<'a> {
    #[serde(rename = "result")]
    results: &'a [PrtgResult],
}

/// Renders results as a PRTG push document, XML declaration included.
pub fn render_xml(results: &[PrtgResult]) -> Result<String, PrtgError> {
    let body = quick_xml::se::to_string(&PrtgDocument { results })?;
    Ok(format!("{XML_HEADER}{body}"))
}

/// Receives mirror entries
pub trait SnapshotSink: Send + Sync {
    fn add(&self, channel: &str, value: f64);
}

/// Latest value per channel
#[derive(Debug, Default)]
pub struct PrtgSnapshot {
    values: Mutex<BTreeMap<String, f64>>,
}

impl PrtgSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> Vec<PrtgResult> {
        match self.values.lock() {
            Ok(values) => values
                .iter()
                .map(|(channel, value)| PrtgResult::new(channel.clone(), *value))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, channel: &str) -> Option<f64> {
        self.values.lock().ok().and_then(|v| v.get(channel).copied())
    }
}

impl SnapshotSink for PrtgSnapshot {
    fn add(&self, channel: &str, value: f64) {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(channel.to_string(), value);
            }
            Err(e) => warn!("Skipping PRTG channel {}: {}", channel, e),
        }
    }
}

/// Folds every drained mirror batch into the snapshot.
pub async fn run_mirror_sender(
    sink: Arc<dyn SnapshotSink>,
    mut rx: mpsc::UnboundedReceiver<Vec<PrtgResult>>,
) {
    debug!("Mirror sender started");
    while let Some(batch) = rx.recv().await {
        apply_batch(sink.as_ref(), &batch);
    }
    debug!("Mirror sender stopped");
}

pub fn apply_batch(sink: &dyn SnapshotSink, batch: &[PrtgResult]) {
    for result in batch {
        sink.add(&result.channel, result.value);
    }
}

/// Posts the snapshot to a PRTG HTTP push sensor
#[derive(Clone)]
pub struct PrtgPusher {
    client: reqwest::Client,
    url: String,
    snapshot: Arc<PrtgSnapshot>,
}

impl PrtgPusher {
    pub fn new(client: reqwest::Client, url: String, snapshot: Arc<PrtgSnapshot>) -> Self {
        Self {
            client,
            url,
            snapshot,
        }
    }

    /// Renders and posts the current snapshot, returning the number of channels sent.
    pub async fn push(&self) -> Result<usize, PrtgError> {
        let results = self.snapshot.results();
        if results.is_empty() {
            debug!("PRTG snapshot is empty, nothing to push");
            return Ok(0);
        }
        let body = render_xml(&results)?;
        debug!("Sending {} channels to PRTG", results.len());

        let resp = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            debug!("PRTG push finished: {}", status);
        } else {
            warn!("PRTG push returned {}", status);
        }
        Ok(results.len())
    }

    pub async fn run(self, period: Duration) {
        info!("PRTG pusher started, pushing to {} every {:?}", self.url, period);
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = self.push().await {
                error!("{}", e);
            }
        }
    }
}
