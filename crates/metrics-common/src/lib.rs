// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod codec;
pub mod errors;
pub mod metric;
pub mod policy;
pub mod retry;

pub use errors::ValidationError;
pub use metric::{metrics_from_payloads, Metric, MetricKind, MetricPayload, MetricValue};
pub use policy::FailurePolicy;
pub use retry::{RetryPolicy, Retryable};
