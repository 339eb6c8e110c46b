// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use metrics_agent::{AgentConfig, AgentMetrics, Collector, Reporter, SystemSampler};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = AgentConfig::parse();

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level.to_lowercase());
    let filter = match EnvFilter::try_new(&env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level {:?}: {e}", config.log_level);
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Metrics agent stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AgentConfig) -> anyhow::Result<()> {
    config.validate()?;

    let metrics = AgentMetrics::default();
    let reporter = Reporter::new(config.reporter_config()?, metrics.clone())?;
    let mut collector = Collector::new(SystemSampler::new(), metrics);
    let cancel = CancellationToken::new();

    let collector_handle = tokio::spawn({
        let cancel = cancel.clone();
        let interval = config.poll_interval();
        async move { collector.run(interval, cancel).await }
    });
    let reporter_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { reporter.run(cancel).await }
    });
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    info!("Metrics agent reporting to {}", config.address);
    let reported = reporter_handle.await.context("reporter task panicked")?;
    cancel.cancel();
    collector_handle.await.context("collector task panicked")?;
    reported.context("unable to deliver metrics")?;
    Ok(())
}
