// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection for the `host` tag

use std::env;
use tracing::warn;

const FALLBACK_HOSTNAME: &str = "unknown";

/// Get the hostname reported in the `host` tag of every point
///
/// Resolution order:
/// 1. explicit override (from `COLLECT_HOSTNAME`)
/// 2. `HOSTNAME` environment variable
/// 3. `gethostname()`
/// 4. `"unknown"`
///
/// Only the first label is kept unless `full` is set, so `web01.example.com` becomes `web01`.
#[must_use]
pub fn get_hostname(override_name: Option<&str>, full: bool) -> String {
    let name = resolve(override_name);
    if full {
        return name;
    }
    match name.split_once('.') {
        Some((short, _)) if !short.is_empty() => short.to_string(),
        _ => name,
    }
}

fn resolve(override_name: Option<&str>) -> String {
    if let Some(name) = override_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.trim().is_empty() {
            return hostname.trim().to_string();
        }
    }

    match nix::unistd::gethostname() {
        Ok(hostname_osstr) => {
            if let Some(hostname_str) = hostname_osstr.to_str() {
                if !hostname_str.is_empty() {
                    return hostname_str.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using '{FALLBACK_HOSTNAME}'");
    FALLBACK_HOSTNAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_hostname_not_empty() {
        let hostname = get_hostname(None, true);
        assert!(!hostname.is_empty());
    }

    #[test]
    #[serial]
    fn test_override_wins() {
        assert_eq!(get_hostname(Some("test-host"), false), "test-host");
        assert_eq!(get_hostname(Some("  "), true), get_hostname(None, true));
    }

    #[test]
    #[serial]
    fn test_short_name_strips_domain() {
        assert_eq!(get_hostname(Some("web01.example.com"), false), "web01");
        assert_eq!(
            get_hostname(Some("web01.example.com"), true),
            "web01.example.com"
        );
    }

    #[test]
    #[serial]
    fn test_hostname_env_fallback() {
        let previous = env::var("HOSTNAME").ok();
        env::set_var("HOSTNAME", "env-host");
        assert_eq!(get_hostname(None, true), "env-host");
        match previous {
            Some(v) => env::set_var("HOSTNAME", v),
            None => env::remove_var("HOSTNAME"),
        }
    }
}
