// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants;
use crate::datapoint::TagSet;
use crate::errors::ConfigError;
use crate::retry::RetryStrategy;

/// Pipeline and agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Primary backend endpoint receiving gzipped JSON batches
    pub tsdb_url: Option<String>,
    /// PRTG HTTP push sensor receiving the XML snapshot
    pub prtg_url: Option<String>,
    /// Bound of the intake queue
    pub max_queue_len: usize,
    /// Maximum number of points per delivery batch
    pub batch_size: usize,
    /// Verbose logging of batching decisions
    pub debug: bool,
    /// Dry run: log batches instead of sending them
    pub print: bool,
    /// Tags added to every point
    pub tags: TagSet,
    /// Overrides hostname detection
    pub hostname: Option<String>,
    /// Keep the fully qualified hostname instead of the first label
    pub full_hostname: bool,
    /// Comma-separated collector name patterns to run
    pub filter: String,
    /// Comma-separated collector name patterns to skip
    pub exclude: String,
    pub freq: Duration,
    pub retry_strategy: RetryStrategy,
    pub flush_timeout: Duration,
    pub prtg_push_interval: Duration,
    pub self_metrics_interval: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tsdb_url: None,
            prtg_url: None,
            max_queue_len: constants::MAX_QUEUE_LEN,
            batch_size: constants::BATCH_SIZE,
            debug: false,
            print: false,
            tags: TagSet::new(),
            hostname: None,
            full_hostname: false,
            filter: String::new(),
            exclude: String::new(),
            freq: constants::DEFAULT_FREQ,
            retry_strategy: RetryStrategy::default(),
            flush_timeout: constants::FLUSH_TIMEOUT,
            prtg_push_interval: constants::PRTG_PUSH_INTERVAL,
            self_metrics_interval: constants::SELF_METRICS_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from `COLLECT_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tags = match env::var("COLLECT_TAGS") {
            Ok(raw) => TagSet::parse(&raw).map_err(ConfigError::Invalid)?,
            Err(_) => TagSet::new(),
        };

        let retry_strategy = RetryStrategy::Fixed(
            env_secs("COLLECT_RETRY_INTERVAL")?.unwrap_or(constants::RETRY_INTERVAL),
        );

        let config = Self {
            tsdb_url: env_string("COLLECT_TSDB_URL"),
            prtg_url: env_string("COLLECT_PRTG_URL"),
            max_queue_len: env_parse("COLLECT_MAX_QUEUE_LEN")?.unwrap_or(defaults.max_queue_len),
            batch_size: env_parse("COLLECT_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            debug: env_bool("COLLECT_DEBUG"),
            print: env_bool("COLLECT_PRINT"),
            tags,
            hostname: env_string("COLLECT_HOSTNAME"),
            full_hostname: env_bool("COLLECT_FULL_HOSTNAME"),
            filter: env::var("COLLECT_FILTER").unwrap_or_default(),
            exclude: env::var("COLLECT_EXCLUDE").unwrap_or_default(),
            freq: env_secs("COLLECT_FREQ")?.unwrap_or(defaults.freq),
            retry_strategy,
            flush_timeout: env_secs("COLLECT_FLUSH_TIMEOUT")?.unwrap_or(defaults.flush_timeout),
            prtg_push_interval: env_secs("COLLECT_PRTG_PUSH_INTERVAL")?
                .unwrap_or(defaults.prtg_push_interval),
            self_metrics_interval: env_secs("COLLECT_SELF_METRICS_INTERVAL")?
                .unwrap_or(defaults.self_metrics_interval),
            log_level: env::var("COLLECT_LOG_LEVEL")
                .map(|val| val.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_len == 0 {
            return Err(ConfigError::Invalid(
                "max queue length must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch size must be greater than 0".to_string(),
            ));
        }

        match &self.tsdb_url {
            Some(url) => validate_url(url)?,
            None if !self.print => return Err(ConfigError::Missing("COLLECT_TSDB_URL")),
            None => {}
        }
        if let Some(url) = &self.prtg_url {
            validate_url(url)?;
        }

        for (name, d) in [
            ("COLLECT_FREQ", self.freq),
            ("COLLECT_FLUSH_TIMEOUT", self.flush_timeout),
            ("COLLECT_PRTG_PUSH_INTERVAL", self.prtg_push_interval),
            ("COLLECT_SELF_METRICS_INTERVAL", self.self_metrics_interval),
        ] {
            if d.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Effective log level: `debug` forces at least debug output.
    #[must_use]
    pub fn effective_log_level(&self) -> &str {
        if self.debug && matches!(self.log_level.as_str(), "info" | "warn" | "error") {
            "debug"
        } else {
            &self.log_level
        }
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "URL '{url}' must start with http:// or https://"
        )))
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> bool {
    env::var(key)
        .map(|val| matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key}: cannot parse '{raw}'"))),
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "COLLECT_TSDB_URL",
        "COLLECT_PRTG_URL",
        "COLLECT_MAX_QUEUE_LEN",
        "COLLECT_BATCH_SIZE",
        "COLLECT_DEBUG",
        "COLLECT_PRINT",
        "COLLECT_TAGS",
        "COLLECT_RETRY_INTERVAL",
        "COLLECT_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn valid() -> Config {
        Config {
            tsdb_url: Some("http://tsdb:4242/api/put".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_needs_endpoint() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::Missing("COLLECT_TSDB_URL"))
        ));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_print_mode_does_not_need_endpoint() {
        let config = Config {
            print: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = Config {
            max_queue_len: 0,
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = Config {
            batch_size: 0,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = Config {
            tsdb_url: Some("tsdb:4242".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            prtg_url: Some("ftp://prtg".to_string()),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_raises_log_level() {
        let config = Config {
            debug: true,
            ..valid()
        };
        assert_eq!(config.effective_log_level(), "debug");

        let config = Config {
            debug: true,
            log_level: "trace".to_string(),
            ..valid()
        };
        assert_eq!(config.effective_log_level(), "trace");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("COLLECT_TSDB_URL", "http://tsdb:4242/api/put");
        env::set_var("COLLECT_MAX_QUEUE_LEN", "10");
        env::set_var("COLLECT_BATCH_SIZE", "2");
        env::set_var("COLLECT_TAGS", "dc=ny,role=web");
        env::set_var("COLLECT_RETRY_INTERVAL", "7");
        env::set_var("COLLECT_DEBUG", "true");

        let config = Config::from_env().expect("config");
        assert_eq!(config.max_queue_len, 10);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.tags.get("dc"), Some("ny"));
        assert_eq!(config.retry_strategy, RetryStrategy::Fixed(Duration::from_secs(7)));
        assert!(config.debug);
        assert!(!config.print);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        env::set_var("COLLECT_TSDB_URL", "http://tsdb:4242/api/put");
        env::set_var("COLLECT_BATCH_SIZE", "lots");
        assert!(Config::from_env().is_err());

        env::set_var("COLLECT_BATCH_SIZE", "5");
        env::set_var("COLLECT_TAGS", "broken");
        assert!(Config::from_env().is_err());
        clear_env();
    }
}
