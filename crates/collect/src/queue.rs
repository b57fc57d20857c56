// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded intake queue and its PRTG mirror buffer.
//!
//! ```text
//!   collectors ──► fan-in channel ──► queuer ──┬─► intake queue (JSON) ──► batch sender
//!                                              └─► mirror buffer (channel, value) ──► mirror sender
//! ```
//!
//! Both buffers live behind one mutex and are appended and drained together, so entry `i` of
//! the mirror always describes entry `i` of the intake queue. The `dropped`/`sent` counters sit
//! behind a second mutex that is never taken while the queue lock is held.
//!
//! When the queue is full new points are discarded and counted; producers are never blocked by a
//! slow or unreachable backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::datapoint::DataPoint;
use crate::prtg::PrtgResult;

#[derive(Debug, Default)]
struct Buffers {
    intake: VecDeque<Vec<u8>>,
    mirror: VecDeque<PrtgResult>,
}

/// Snapshot of the delivery counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub dropped: u64,
    pub sent: u64,
}

/// Entries removed from the front of both buffers in one critical section
#[derive(Debug, Default)]
pub struct Batch {
    pub points: Vec<Vec<u8>>,
    pub mirror: Vec<PrtgResult>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// What happened to a single point offered to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    Dropped,
    Invalid,
}

#[derive(Debug)]
pub struct Queue {
    buffers: Mutex<Buffers>,
    counters: Mutex<Counters>,
    max_len: usize,
}

impl Queue {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            buffers: Mutex::new(Buffers::default()),
            counters: Mutex::new(Counters::default()),
            max_len,
        }
    }

    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        match self.buffers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn counters_guard(&self) -> MutexGuard<'_, Counters> {
        match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Offers one point to the queue.
    pub fn push(&self, dp: &DataPoint) -> Enqueued {
        let outcome = {
            let mut buffers = self.buffers();
            self.push_locked(&mut buffers, dp)
        };
        if outcome == Enqueued::Dropped {
            self.record_dropped(1);
        }
        outcome
    }

    fn push_locked(&self, buffers: &mut Buffers, dp: &DataPoint) -> Enqueued {
        if buffers.intake.len() >= self.max_len {
            return Enqueued::Dropped;
        }
        match dp.to_json() {
            Ok(encoded) => {
                buffers.intake.push_back(encoded);
                buffers.mirror.push_back(PrtgResult::from(dp));
                Enqueued::Accepted
            }
            Err(e) => {
                error!("Failed to serialize point {}: {}", dp.metric, e);
                Enqueued::Invalid
            }
        }
    }

    /// Removes up to `batch_size` entries from the front of both buffers.
    ///
    /// Returns `None` when the queue is empty.
    pub fn drain(&self, batch_size: usize) -> Option<Batch> {
        let mut buffers = self.buffers();
        let n = buffers.intake.len().min(batch_size);
        if n == 0 {
            return None;
        }
        let points: Vec<Vec<u8>> = buffers.intake.drain(..n).collect();
        let mirror: Vec<PrtgResult> = buffers.mirror.drain(..n).collect();
        debug!("sending: {}, remaining: {}", n, buffers.intake.len());
        Some(Batch { points, mirror })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers().intake.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lengths of the intake queue and the mirror buffer, read under one lock.
    #[must_use]
    pub fn lengths(&self) -> (usize, usize) {
        let buffers = self.buffers();
        (buffers.intake.len(), buffers.mirror.len())
    }

    pub fn record_dropped(&self, n: u64) {
        if n > 0 {
            self.counters_guard().dropped += n;
        }
    }

    pub fn record_sent(&self, n: u64) {
        self.counters_guard().sent += n;
    }

    #[must_use]
    pub fn counters(&self) -> Counters {
        *self.counters_guard()
    }
}

/// Drains the fan-in channel into the queue until every sender is gone.
///
/// After each received point, any points already waiting on the channel are absorbed without
/// releasing the queue lock. Drops are tallied locally and added to the counters once the queue
/// lock is released.
pub async fn run_queuer(queue: Arc<Queue>, mut rx: mpsc::Receiver<DataPoint>) {
    debug!("Queuer started");
    while let Some(first) = rx.recv().await {
        let mut dropped = 0u64;
        {
            let mut buffers = queue.buffers();
            let mut next = Some(first);
            while let Some(dp) = next {
                if queue.push_locked(&mut buffers, &dp) == Enqueued::Dropped {
                    dropped += 1;
                }
                next = rx.try_recv().ok();
            }
        }
        if dropped > 0 {
            warn!("Intake queue full, dropped {} points", dropped);
            queue.record_dropped(dropped);
        }
    }
    debug!("Queuer stopped: fan-in channel closed");
}
