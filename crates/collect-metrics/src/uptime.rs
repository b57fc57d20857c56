// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::Path;

use collect::datapoint::DataPoint;
use collect::errors::CollectorError;
use collect::factory::PointFactory;
use collect::metadata::{RateType, Unit};

pub const UPTIME_METRIC: &str = "os.system.uptime";
pub const PROC_UPTIME_PATH: &str = "/proc/uptime";

/// Seconds since boot, the first field of `/proc/uptime`.
pub fn parse_uptime(contents: &str) -> Result<f64, CollectorError> {
    contents
        .split_whitespace()
        .next()
        .and_then(|field| field.parse::<f64>().ok())
        .filter(|secs| secs.is_finite())
        .ok_or_else(|| CollectorError::Parse(format!("unexpected uptime '{}'", contents.trim())))
}

pub fn collect_uptime(
    factory: &PointFactory,
    path: &Path,
) -> Result<Vec<DataPoint>, CollectorError> {
    let uptime = parse_uptime(&fs::read_to_string(path)?)?;
    let mut md = Vec::with_capacity(1);
    factory.add(
        &mut md,
        UPTIME_METRIC,
        uptime.trunc() as i64,
        None,
        RateType::Gauge,
        Unit::Second,
        "Seconds since the system booted.",
    );
    Ok(md)
}

#[cfg(test)]
mod tests {
    use super::*;
    use collect::clock::Clock;
    use collect::datapoint::{TagSet, Value};
    use collect::metadata::NoopMetadata;
    use std::sync::Arc;

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("350735.47 234388.90\n").expect("uptime"), 350_735.47);
        assert!(parse_uptime("").is_err());
        assert!(parse_uptime("soon").is_err());
    }

    #[test]
    fn test_collect_uptime_from_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("uptime");
        fs::write(&path, "120.99 80.00\n").expect("write");
        let factory = PointFactory::new(Clock::fixed(1), "h", TagSet::new(), Arc::new(NoopMetadata));

        let md = collect_uptime(&factory, &path).expect("points");
        assert_eq!(md.len(), 1);
        assert_eq!(md[0].metric, UPTIME_METRIC);
        assert_eq!(md[0].value, Value::Int(120));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let factory = PointFactory::new(Clock::fixed(1), "h", TagSet::new(), Arc::new(NoopMetadata));
        assert!(matches!(
            collect_uptime(&factory, Path::new("/nonexistent/uptime")),
            Err(CollectorError::Io(_))
        ));
    }
}
