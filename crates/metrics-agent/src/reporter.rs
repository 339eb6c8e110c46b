// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of the agent's metric set to the server's batch endpoint.

use std::time::Duration;

use metrics_common::codec::{self, Compression, SIGNATURE_HEADER};
use metrics_common::{FailurePolicy, Metric, MetricPayload, RetryPolicy, Retryable};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::AgentMetrics;
use crate::errors::ReportError;

pub const UPDATES_PATH: &str = "/updates/";

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Server address, either `host:port` or a full `http(s)://` base URL.
    pub address: String,
    pub interval: Duration,
    pub compression: Option<Compression>,
    /// Signing key. No signature header is sent without one.
    pub key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
}

/// A serialized metric set, ready to be sent as many times as needed.
#[derive(Debug, Clone)]
pub struct EncodedReport {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    pub metric_count: usize,
}

pub struct Reporter {
    client: reqwest::Client,
    url: String,
    config: ReporterConfig,
    metrics: AgentMetrics,
}

/// `http://host:port/updates/` for a bare address, the base URL plus the path
/// otherwise.
pub fn updates_url(address: &str) -> String {
    let base = address.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}{UPDATES_PATH}")
    } else {
        format!("http://{base}{UPDATES_PATH}")
    }
}

impl Reporter {
    pub fn new(config: ReporterConfig, metrics: AgentMetrics) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ReportError::Client)?;
        Ok(Self {
            client,
            url: updates_url(&config.address),
            config,
            metrics,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serializes `metrics`, signs the JSON and then compresses it.
    pub fn encode(&self, metrics: &[Metric]) -> Result<EncodedReport, ReportError> {
        let payloads: Vec<MetricPayload> = metrics.iter().map(MetricPayload::from).collect();
        let json = serde_json::to_vec(&payloads)?;
        let signature = match self.config.key.as_deref() {
            Some(key) => Some(codec::sign(key, &json).ok_or(ReportError::Signing)?),
            None => None,
        };
        let body = match self.config.compression {
            Some(compression) => compression.compress(&json)?,
            None => json,
        };
        Ok(EncodedReport {
            body,
            signature,
            metric_count: payloads.len(),
        })
    }

    async fn send(&self, report: &EncodedReport) -> Result<(), ReportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT_ENCODING, "gzip")
            .body(report.body.clone());
        if let Some(compression) = self.config.compression {
            request = request.header(CONTENT_ENCODING, compression.content_encoding());
        }
        if let Some(signature) = &report.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await.map_err(ReportError::Transport)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Status(status.as_u16()))
        }
    }

    /// Sends the current metric set, retrying per the configured policy.
    /// Returns how many metrics were delivered; an empty set is skipped and
    /// counts as zero.
    pub async fn report(&self) -> Result<usize, ReportError> {
        let metrics = self.metrics.snapshot().await;
        if metrics.is_empty() {
            debug!("Nothing sampled yet, skipping report");
            return Ok(0);
        }
        let report = self.encode(&metrics)?;

        match self
            .config
            .retry
            .run("report metrics", || self.send(&report))
            .await
        {
            Ok(()) => {
                debug!(
                    "Reported {} metrics ({} bytes) to {}",
                    report.metric_count,
                    report.body.len(),
                    self.url
                );
                Ok(report.metric_count)
            }
            Err(e) if e.is_retryable() => Err(ReportError::RetriesExhausted {
                attempts: self.config.retry.max_attempts(),
                source: Box::new(e),
            }),
            Err(e) => Err(e),
        }
    }

    /// Reports once per interval until `cancel` fires. Under
    /// [`FailurePolicy::FailFast`] a failed report ends the loop with its
    /// error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ReportError> {
        let interval = self.config.interval;
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Reporting metrics to {} every {interval:?}", self.url);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.report() => result,
            };
            if let Err(e) = result {
                match self.config.failure_policy {
                    FailurePolicy::FailFast => {
                        error!("No connection to server, stopping reporter: {e}");
                        return Err(e);
                    }
                    FailurePolicy::LogAndContinue => {
                        warn!("Failed to report metrics, will try again next interval: {e}");
                    }
                }
            }
        }
        debug!("Reporter stopped");
        Ok(())
    }
}
