// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_common::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to serialize metrics: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("failed to sign payload")]
    Signing,

    #[error("failed to compress payload: {0}")]
    Compression(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<ReportError>,
    },
}

impl Retryable for ReportError {
    /// Transport failures and non-2xx answers are worth another attempt,
    /// anything about the payload itself is not.
    fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Transport(_) | ReportError::Status(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
