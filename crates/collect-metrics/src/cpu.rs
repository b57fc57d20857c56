// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Container CPU usage and limit from cgroup v1.
//!
//! Both metrics are reported in nanocores (1 core = 1,000,000,000 nanocores). Usage is the
//! cumulative CPU time consumed by the cgroup; the backend derives a rate from it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use collect::datapoint::{DataPoint, TagSet};
use collect::errors::CollectorError;
use collect::factory::PointFactory;
use collect::metadata::{RateType, Unit};
use tracing::debug;

pub const CPU_USAGE_METRIC: &str = "os.cpu.usage";
pub const CPU_LIMIT_METRIC: &str = "os.cpu.limit";

const NANOCORES_PER_CPU: f64 = 1_000_000_000.0;

/// cgroup v1 file locations, rooted at `/sys/fs/cgroup` on a real host
#[derive(Debug, Clone)]
pub struct CgroupPaths {
    /// Total CPU time consumed by all tasks, in nanoseconds
    pub usage: PathBuf,
    /// CPUs the tasks may run on, e.g. `0-2,16`
    pub cpuset: PathBuf,
    /// CFS period in microseconds
    pub period: PathBuf,
    /// CFS quota in microseconds, `-1` when unlimited
    pub quota: PathBuf,
}

impl CgroupPaths {
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            usage: root.join("cpu/cpuacct.usage"),
            cpuset: root.join("cpuset/cpuset.cpus"),
            period: root.join("cpu/cpu.cfs_period_us"),
            quota: root.join("cpu/cpu.cfs_quota_us"),
        }
    }
}

impl Default for CgroupPaths {
    fn default() -> Self {
        Self::under("/sys/fs/cgroup")
    }
}

/// Raw cgroup values, normalized to nanoseconds
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct CgroupStats {
    total: Option<u64>,
    cpu_count: Option<u64>,
    scheduler_period: Option<u64>,
    scheduler_quota: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuStats {
    /// Cumulative usage in nanoseconds
    pub total: f64,
    /// Limit in nanocores
    pub limit: f64,
    /// The limit fell back to the host CPU count
    pub defaulted_limit: bool,
}

/// Reads usage and limit. Fails only when usage itself is unreadable.
pub fn read_cpu_stats(paths: &CgroupPaths, host_cpus: u64) -> Result<CpuStats, CollectorError> {
    let stats = read_cgroup_stats(paths);
    let total = stats.total.ok_or_else(|| {
        CollectorError::Unavailable(format!("no cgroup CPU usage at {}", paths.usage.display()))
    })?;
    let (limit, defaulted_limit) = compute_cpu_limit_nc(&stats, host_cpus);
    Ok(CpuStats {
        total: total as f64,
        limit,
        defaulted_limit,
    })
}

/// Sampling function for an `IntervalCollector`.
pub fn collect_cpu(
    factory: &PointFactory,
    paths: &CgroupPaths,
    host_cpus: u64,
) -> Result<Vec<DataPoint>, CollectorError> {
    let stats = read_cpu_stats(paths, host_cpus)?;

    let mut md = Vec::with_capacity(2);
    factory.add(
        &mut md,
        CPU_USAGE_METRIC,
        stats.total,
        None,
        RateType::Counter,
        Unit::Nanocores,
        "CPU time consumed by the cgroup.",
    );
    let tags: TagSet = [(
        "source",
        if stats.defaulted_limit { "host" } else { "cgroup" },
    )]
    .into_iter()
    .collect();
    factory.add(
        &mut md,
        CPU_LIMIT_METRIC,
        stats.limit,
        Some(&tags),
        RateType::Gauge,
        Unit::Nanocores,
        "CPU available to the cgroup.",
    );
    Ok(md)
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path)
        .ok()
        .and_then(|contents| contents.trim().parse::<u64>().ok())
}

fn read_cgroup_stats(paths: &CgroupPaths) -> CgroupStats {
    let total = read_u64(&paths.usage);
    if total.is_none() {
        debug!("Could not read CPU usage from {}", paths.usage.display());
    }

    let cpu_count = match read_cpu_count_from_file(&paths.cpuset) {
        Ok(count) => Some(count),
        Err(e) => {
            debug!("Could not read CPU count from {}: {}", paths.cpuset.display(), e);
            None
        }
    };

    let scheduler_period = read_u64(&paths.period).and_then(micros_to_nanos);
    let scheduler_quota = fs::read_to_string(&paths.quota)
        .ok()
        .and_then(|contents| contents.trim().parse::<i64>().ok())
        .and_then(|quota| u64::try_from(quota).ok())
        .and_then(micros_to_nanos);
    if scheduler_quota.is_none() {
        debug!("No CFS quota at {}", paths.quota.display());
    }

    CgroupStats {
        total,
        cpu_count,
        scheduler_period,
        scheduler_quota,
    }
}

/// `None` when the value does not fit in nanoseconds.
fn micros_to_nanos(micros: u64) -> Option<u64> {
    micros.checked_mul(1000)
}

fn read_cpu_count_from_file(path: &Path) -> Result<u64, io::Error> {
    let contents = fs::read_to_string(path)?;
    parse_cpuset(contents.trim())
}

/// Counts the CPUs in a cpuset list: `0-2,16` is 4 CPUs.
pub fn parse_cpuset(cpuset: &str) -> Result<u64, io::Error> {
    if cpuset.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "empty cpuset"));
    }

    let invalid = |part: &str| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid cpuset entry '{part}'"),
        )
    };

    let mut cpu_count: u64 = 0;
    for part in cpuset.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u64 = start.parse().map_err(|_| invalid(part))?;
                let end: u64 = end.parse().map_err(|_| invalid(part))?;
                if end < start {
                    return Err(invalid(part));
                }
                cpu_count += end - start + 1;
            }
            None => {
                part.parse::<u64>().map_err(|_| invalid(part))?;
                cpu_count += 1;
            }
        }
    }
    Ok(cpu_count)
}

/// Limit in nanocores, falling back to every host CPU when the cgroup sets none.
fn compute_cpu_limit_nc(stats: &CgroupStats, host_cpus: u64) -> (f64, bool) {
    match compute_cgroup_cpu_limit_nc(stats, host_cpus) {
        Some(limit) => (limit, false),
        None => {
            debug!("No CPU limit found, using host CPU count: {}", host_cpus);
            (host_cpus as f64 * NANOCORES_PER_CPU, true)
        }
    }
}

/// min(cpuset, CFS quota). A cpuset spanning every host CPU is not a limit.
fn compute_cgroup_cpu_limit_nc(stats: &CgroupStats, host_cpus: u64) -> Option<f64> {
    let cpuset_limit = stats
        .cpu_count
        .filter(|count| *count != host_cpus)
        .map(|count| count as f64 * NANOCORES_PER_CPU);

    let quota_limit = match (stats.scheduler_quota, stats.scheduler_period) {
        (Some(quota), Some(period)) if period > 0 => {
            Some(NANOCORES_PER_CPU * (quota as f64 / period as f64))
        }
        _ => None,
    };

    match (cpuset_limit, quota_limit) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
