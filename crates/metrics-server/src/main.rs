// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_common::FailurePolicy;
use metrics_store::{DurableStore, EphemeralStore, SnapshotManager, Store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use metrics_server::{MetricsServer, ServerConfig};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = ServerConfig::parse();

    let env_filter = format!(
        "h2=off,hyper=off,sqlx=warn,{}",
        config.log_level.to_lowercase()
    );
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
            error!("Metrics server stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let listener = MetricsServer::bind(&config.address).await?;
    let (store, snapshots) = open_store(&config).await?;
    let cancel = CancellationToken::new();

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

    let snapshot_handle = snapshots.map(|snapshots| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = snapshots.run(cancel.clone()).await;
            // A failed snapshot loop takes the server down with it.
            cancel.cancel();
            result
        })
    });

    let server = MetricsServer::new(store, config.key());
    let served = server.serve(listener, cancel.clone()).await;
    cancel.cancel();

    if let Some(handle) = snapshot_handle {
        handle
            .await
            .context("snapshot task panicked")?
            .context("unable to persist metrics")?;
    }
    served?;
    Ok(())
}

async fn open_store(
    config: &ServerConfig,
) -> anyhow::Result<(Arc<dyn Store>, Option<SnapshotManager>)> {
    if let Some(durable) = config.durable_store_config() {
        let store = DurableStore::connect(&durable)
            .await
            .context("metrics database is unreachable")?;
        if !config.restore {
            store
                .clear()
                .await
                .context("unable to clear stored metrics")?;
            info!("Cleared stored metrics");
        }
        return Ok((Arc::new(store), None));
    }

    let store: Arc<dyn Store> = Arc::new(EphemeralStore::new());
    let snapshots = SnapshotManager::new(
        Arc::clone(&store),
        &config.file_storage_path,
        config.store_interval(),
    )
    .with_failure_policy(config.snapshot_failure_policy);

    if config.restore {
        match snapshots.restore().await {
            Ok(_) => {}
            Err(e) if config.snapshot_failure_policy == FailurePolicy::LogAndContinue => {
                warn!("Starting without restored metrics: {e}");
            }
            Err(e) => return Err(e).context("unable to restore metrics snapshot"),
        }
    }
    Ok((store, Some(snapshots)))
}
