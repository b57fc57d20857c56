// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use collect::{
    clock::Clock,
    collectors::Registry,
    config::Config,
    factory::PointFactory,
    hostname::get_hostname,
    metadata::InMemoryMetadata,
    pipeline::Pipeline,
};

mod logger;

#[tokio::main]
pub async fn main() {
    let config = Config::from_env();
    let log_level = config
        .as_ref()
        .map(|c| c.effective_log_level().to_string())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&log_level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };
    debug!("Logging subsystem enabled");

    let hostname = get_hostname(config.hostname.as_deref(), config.full_hostname);
    info!("Starting collect agent on {}", hostname);

    let clock = Clock::new();
    let _clock_updater = clock.spawn_updater();

    let metadata = Arc::new(InMemoryMetadata::new());
    let factory = PointFactory::new(clock, hostname, config.tags.clone(), metadata);

    let mut registry = Registry::new();
    collect_metrics::register_all(&mut registry, &factory, config.freq);

    let selected = registry.search(&config.filter, &config.exclude);
    if selected.is_empty() {
        error!(
            "No collectors match filter '{}' and exclude '{}', available: {:?}",
            config.filter,
            config.exclude,
            registry.names()
        );
        return;
    }
    for collector in &selected {
        collector.init();
    }

    let fan_in = registry.run(Some(selected));
    let handle = Pipeline::new(config, factory).start(fan_in);

    wait_for_shutdown().await;
    handle.shutdown();
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Unable to listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        () = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT"),
        Err(e) => error!("Unable to listen for shutdown signal: {}", e),
    }
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=warn,{log_level}");
    let filter = match EnvFilter::try_new(&env_filter) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info"),
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(logger::Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set up logging: {e}");
    }
}
