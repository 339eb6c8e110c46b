// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::StatusCode;
use metrics_common::ValidationError;
use metrics_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
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

/// Status answered for a payload that failed validation. A metric without an
/// id is reported as not found, everything else as a bad request.
pub fn validation_status(err: &ValidationError) -> StatusCode {
    match err {
        ValidationError::MissingId => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

pub fn store_error_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Validation(e) => validation_status(e),
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Database(_) | StoreError::InvalidRow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
