// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic full-state snapshots of a [`Store`] to a local file.
//!
//! The file is a stream of JSON documents, each an array of metric payloads.
//! [`SnapshotManager::write`] always produces a single document; restore
//! accepts any number of them and replays them in order.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use metrics_common::{metrics_from_payloads, FailurePolicy, MetricPayload};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::SnapshotError;
use crate::store::Store;

/// Shorter configured intervals are raised to this.
pub const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

pub struct SnapshotManager {
    store: Arc<dyn Store>,
    path: PathBuf,
    interval: Duration,
    failure_policy: FailurePolicy,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn Store>, path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            store,
            path: path.into(),
            interval: interval.max(MIN_SNAPSHOT_INTERVAL),
            failure_policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn io_error(&self, source: io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Replaces the file with the current store contents and returns the
    /// number of metrics written. The file is truncated before the new
    /// contents land.
    pub async fn write(&self) -> Result<usize, SnapshotError> {
        let payloads: Vec<MetricPayload> = self
            .store
            .all()
            .await?
            .iter()
            .map(MetricPayload::from)
            .collect();
        let body = serde_json::to_vec(&payloads)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, &body)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(
            "Wrote snapshot of {} metrics ({} bytes) to {}",
            payloads.len(),
            body.len(),
            self.path.display()
        );
        Ok(payloads.len())
    }

    /// Loads the file into the store, counters as absolute values. A missing
    /// file restores nothing.
    pub async fn restore(&self) -> Result<usize, SnapshotError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(
                    "No snapshot found at {}, starting with an empty store",
                    self.path.display()
                );
                return Ok(0);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let mut restored = 0;
        let documents = serde_json::Deserializer::from_slice(&data).into_iter::<Vec<MetricPayload>>();
        for document in documents {
            let metrics = metrics_from_payloads(document?)?;
            restored += metrics.len();
            self.store.restore(metrics).await?;
        }

        info!(
            "Restored {restored} metrics from snapshot {}",
            self.path.display()
        );
        Ok(restored)
    }

    /// Writes a snapshot every interval until `cancel` fires, then writes a
    /// last one and returns. Under [`FailurePolicy::FailFast`] the first
    /// failed periodic write ends the loop with its error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SnapshotError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Snapshotting metrics to {} every {:?}",
            self.path.display(),
            self.interval
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Writing final snapshot to {}", self.path.display());
                    return self.write().await.map(|_| ());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.write().await {
                        match self.failure_policy {
                            FailurePolicy::FailFast => {
                                error!("Failed to write snapshot: {e}");
                                return Err(e);
                            }
                            FailurePolicy::LogAndContinue => {
                                warn!("Failed to write snapshot, will retry next interval: {e}");
                            }
                        }
                    }
                }
            }
        }
    }
}
