// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while loading or validating the agent configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting {0}")]
    Missing(&'static str),
}

/// A data point that cannot be represented on the wire
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("metric name is empty")]
    EmptyMetric,

    #[error("metric {0} has a non-finite value")]
    NonFinite(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors a collector can hit while sampling
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("data not available: {0}")]
    Unavailable(String),
}
