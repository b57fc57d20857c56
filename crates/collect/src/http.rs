// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared HTTP client for the primary backend and the PRTG pusher.

use tracing::error;

use crate::config::Config;

/// Creates the client used for every delivery.
///
/// A builder failure is logged and a default client (no timeout) is returned so delivery keeps
/// working.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to configure HTTP client, using default: {}", e);
            reqwest::Client::new()
        }
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.flush_timeout)
        .user_agent(concat!("collect/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_client_with_defaults() {
        let _client = get_client(&Config::default());
    }
}
