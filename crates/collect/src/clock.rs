// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cached wall clock with one second resolution.
//!
//! Building a data point reads [`Clock::now`] instead of asking the OS for the time. A single
//! updater task refreshes the cached epoch second once per second, so a timestamp can be at most
//! one tick stale, which matches the second granularity of the backend.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Clock {
    now: Arc<Mutex<i64>>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Creates a clock primed with the current system time.
    #[must_use]
    pub fn new() -> Self {
        Self::fixed(epoch_seconds())
    }

    /// Creates a clock stuck at `ts` until [`Clock::tick`] or the updater runs.
    #[must_use]
    pub fn fixed(ts: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(ts)),
        }
    }

    /// Returns the cached epoch second.
    #[must_use]
    pub fn now(&self) -> i64 {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Refreshes the cached value from the system clock.
    pub fn tick(&self) {
        self.set(epoch_seconds());
    }

    pub fn set(&self, ts: i64) {
        match self.now.lock() {
            Ok(mut guard) => *guard = ts,
            Err(poisoned) => *poisoned.into_inner() = ts,
        }
    }

    /// Spawns the background task that refreshes the cache every second.
    pub fn spawn_updater(&self) -> JoinHandle<()> {
        let clock = self.clone();
        tokio::spawn(async move {
            debug!("Clock updater started");
            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                clock.tick();
            }
        })
    }
}

fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
