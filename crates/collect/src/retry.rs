// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delay applied by the batch sender after a failed delivery.
//!
//! Failed batches are always retried, with no ceiling on the number of attempts. Under a long
//! outage every cycle re-injects the whole batch, so the default fixed interval can turn into a
//! steady retry storm against the backend; `Exponential` is available when that matters.

use std::time::Duration;

use crate::constants::RETRY_INTERVAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Same delay after every failure.
    Fixed(Duration),
    /// Doubles from `initial` per consecutive failure, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Fixed(RETRY_INTERVAL)
    }
}

impl RetryStrategy {
    /// Delay before the next drain, given how many deliveries in a row have failed (>= 1).
    #[must_use]
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match *self {
            RetryStrategy::Fixed(d) => d,
            RetryStrategy::Exponential { initial, max } => {
                let shift = consecutive_failures.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}
