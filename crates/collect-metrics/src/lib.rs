// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host collectors for the collect pipeline.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::Path;
use std::time::Duration;

use collect::collectors::{IntervalCollector, Registry};
use collect::factory::PointFactory;

pub mod cpu;
pub mod uptime;

/// Registers every host collector, each sampling every `freq`.
pub fn register_all(registry: &mut Registry, factory: &PointFactory, freq: Duration) {
    let paths = cpu::CgroupPaths::default();
    let host_cpus = num_cpus::get() as u64;
    registry.register(IntervalCollector::new(
        "c_cpu_cgroup_linux",
        freq,
        factory.clone(),
        move |f| cpu::collect_cpu(f, &paths, host_cpus),
    ));

    registry.register(IntervalCollector::new(
        "c_uptime_linux",
        freq,
        factory.clone(),
        |f| uptime::collect_uptime(f, Path::new(uptime::PROC_UPTIME_PATH)),
    ));
}
