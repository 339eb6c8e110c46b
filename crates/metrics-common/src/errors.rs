// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Errors raised while turning untrusted input into a [`crate::Metric`].
//!
//! Validation errors are never retried: they describe the request, not the
//! state of any backend.

use crate::metric::MetricKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("metric id is missing")]
    MissingId,

    #[error("unknown metric type: {0:?}")]
    UnknownKind(String),

    #[error("metric {id:?} carries neither a value nor a delta")]
    MissingValue { id: String },

    #[error("metric {id:?} of type {kind} carries the wrong value field")]
    TypeMismatch { id: String, kind: MetricKind },

    #[error("metric {id:?} carries a non-finite gauge value")]
    NonFiniteValue { id: String },

    #[error("cannot parse {raw:?} as a {kind} value")]
    InvalidValue { raw: String, kind: MetricKind },
}
