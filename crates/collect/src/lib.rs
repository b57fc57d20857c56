// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Intake, buffering and delivery pipeline for host telemetry.
//!
//! Collectors registered in a [`collectors::Registry`] write [`datapoint::DataPoint`]s into a
//! single fan-in channel. The [`queue`] consumer serializes them into a bounded in-memory queue
//! (plus a positional PRTG mirror), and the [`flusher`] drains fixed-size batches, gzips them and
//! posts them to the primary backend, re-injecting failed batches through the fan-in channel.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod clock;
pub mod collectors;
pub mod config;
pub mod constants;
pub mod datapoint;
pub mod errors;
pub mod factory;
pub mod flusher;
pub mod hostname;
pub mod http;
pub mod metadata;
pub mod pipeline;
pub mod prtg;
pub mod queue;
pub mod retry;
pub mod self_metrics;
