// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Default bound of the intake queue.
pub const MAX_QUEUE_LEN: usize = 200_000;

/// Default maximum number of points per delivery batch.
pub const BATCH_SIZE: usize = 500;

/// How long the batch sender sleeps when the queue is empty.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay between delivery attempts after a failed batch.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between collector runs.
pub const DEFAULT_FREQ: Duration = Duration::from_secs(15);

pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

pub const PRTG_PUSH_INTERVAL: Duration = Duration::from_secs(60);

pub const SELF_METRICS_INTERVAL: Duration = Duration::from_secs(15);

/// Capacity of the fan-in channel. tokio has no zero-capacity channel, one slot is the closest
/// to a rendezvous: a stalled consumer still throttles every producer.
pub const FAN_IN_CAPACITY: usize = 1;

pub const HOST_TAG: &str = "host";

// Self metrics reported through the pipeline itself.
pub const POST_TOTAL_DURATION: &str = "collect.post.total_duration";
pub const POST_COUNT: &str = "collect.post.count";
pub const POST_ERROR: &str = "collect.post.error";
pub const POST_BAD_STATUS: &str = "collect.post.bad_status";
pub const POST_RESTORE: &str = "collect.post.restore";
pub const DROPPED: &str = "collect.dropped";
pub const SENT: &str = "collect.sent";
pub const QUEUED: &str = "collect.queued";
