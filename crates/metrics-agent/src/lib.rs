// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector;
pub mod config;
pub mod errors;
pub mod reporter;

pub use collector::{AgentMetrics, Collector, RuntimeSampler, SystemSampler};
pub use config::AgentConfig;
pub use errors::{ConfigError, ReportError};
pub use reporter::{Reporter, ReporterConfig};
