// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use metrics_common::{Metric, MetricKind};

use crate::errors::StoreError;

/// Point storage for gauges and counters.
///
/// Gauge updates overwrite the stored value; counter updates add their delta
/// to it. Implementations must stay consistent under concurrent callers: two
/// concurrent counter updates on the same id both land.
#[async_trait]
pub trait Store: Send + Sync {
    async fn update(&self, metric: &Metric) -> Result<(), StoreError>;

    /// Applies a whole batch. Atomicity is backend specific: the relational
    /// store commits all or nothing, the in-memory store applies metric by
    /// metric and keeps whatever was applied before a failing element.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when `id` was never written as `kind`.
    async fn get(&self, kind: MetricKind, id: &str) -> Result<Metric, StoreError>;

    /// Every stored metric, gauges first, each kind ordered by id.
    async fn all(&self) -> Result<Vec<Metric>, StoreError>;

    /// Sets stored values as given. Counters are taken as absolute values and
    /// are not added to what is already stored.
    async fn restore(&self, metrics: Vec<Metric>) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Connectivity probe of the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}
