// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use clap::Parser;
use metrics_common::codec::Compression;
use metrics_common::{FailurePolicy, RetryPolicy};

use crate::errors::ConfigError;
use crate::reporter::ReporterConfig;

/// Samples runtime statistics and reports them to a metrics server.
///
/// Every flag can also be set through the environment variable named next to
/// it; flags win over the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "metrics-agent", version, about, long_about = None)]
pub struct AgentConfig {
    /// Address of the metrics server
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "localhost:8080")]
    pub address: String,

    /// Seconds between two reports
    #[arg(short = 'r', long, env = "REPORT_INTERVAL", default_value_t = 10)]
    pub report_interval: u64,

    /// Seconds between two samples
    #[arg(short = 'p', long, env = "POLL_INTERVAL", default_value_t = 2)]
    pub poll_interval: u64,

    /// Payload compression: gzip, zstd or none
    #[arg(short = 'e', long, env = "COMPRESSION", default_value = "gzip")]
    pub compression: String,

    /// Key used to sign payloads with HMAC-SHA256
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// What to do once a report exhausts its retries: fail-fast or log-and-continue
    #[arg(long, env = "REPORT_FAILURE_POLICY", default_value_t = FailurePolicy::FailFast)]
    pub failure_policy: FailurePolicy,

    /// Per-request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT", default_value_t = 5)]
    pub http_timeout: u64,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::invalid("address", "must not be empty"));
        }
        if self.report_interval == 0 {
            return Err(ConfigError::invalid("report interval", "must be at least 1s"));
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::invalid("poll interval", "must be at least 1s"));
        }
        if self.http_timeout == 0 {
            return Err(ConfigError::invalid("http timeout", "must be at least 1s"));
        }
        if self.key.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::invalid("key", "must not be empty when set"));
        }
        self.compression()?;
        Ok(())
    }

    pub fn compression(&self) -> Result<Option<Compression>, ConfigError> {
        match self.compression.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(None),
            other => other
                .parse()
                .map(Some)
                .map_err(|e: String| ConfigError::invalid("compression", e)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn reporter_config(&self) -> Result<ReporterConfig, ConfigError> {
        Ok(ReporterConfig {
            address: self.address.clone(),
            interval: Duration::from_secs(self.report_interval),
            compression: self.compression()?,
            key: self.key.clone().filter(|key| !key.is_empty()),
            timeout: Duration::from_secs(self.http_timeout),
            retry: RetryPolicy::default(),
            failure_policy: self.failure_policy,
        })
    }
}
