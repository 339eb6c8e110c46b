// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_common::{MetricKind, ValidationError};

use metrics_common::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid metric: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} metric {id:?} not found")]
    NotFound { kind: MetricKind, id: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database returned an unexpected row: {0}")]
    InvalidRow(String),
}

impl StoreError {
    pub fn not_found(kind: MetricKind, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(e) => is_connection_error(e),
            _ => false,
        }
    }
}

/// SQLSTATE class 08, "connection exception".
const CONNECTION_EXCEPTION_CLASS: &str = "08";

/// Whether `err` is a transient connectivity failure worth retrying, as
/// opposed to a logical or data error that would fail the same way again.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.starts_with(CONNECTION_EXCEPTION_CLASS)),
        _ => false,
    }
}

/// Errors from writing or reading the snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("snapshot contains an invalid metric: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_errors_are_connection_errors() {
        let err = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(is_connection_error(&err));
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_logical_errors_are_not_retryable() {
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
        assert!(!is_connection_error(&sqlx::Error::PoolClosed));
        assert!(!is_connection_error(&sqlx::Error::ColumnNotFound(
            "delta".to_string()
        )));
        assert!(!StoreError::not_found(MetricKind::Gauge, "cpu").is_retryable());
        assert!(!StoreError::from(ValidationError::MissingId).is_retryable());
    }

    #[derive(Debug)]
    struct SqlState(&'static str);

    impl std::fmt::Display for SqlState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl std::error::Error for SqlState {}

    impl sqlx::error::DatabaseError for SqlState {
        fn message(&self) -> &str {
            "simulated database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    #[test]
    fn test_sqlstate_classification() {
        // connection_failure
        let err = sqlx::Error::Database(Box::new(SqlState("08006")));
        assert!(is_connection_error(&err));
        // unique_violation
        let err = sqlx::Error::Database(Box::new(SqlState("23505")));
        assert!(!is_connection_error(&err));
    }

    #[test]
    fn test_store_error_wraps_connection_class() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }
}
