// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-local store with no durability of its own.
//!
//! Both namespaces sit behind a single reader-writer lock: updates, restores
//! and clears take it exclusively, lookups share it.
//!
//! `update_batch` is not transactional here. Elements are applied one by one
//! and an invalid element leaves the ones before it in place.

use std::collections::BTreeMap;

use async_trait::async_trait;
use metrics_common::{Metric, MetricKind, MetricValue};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::StoreError;
use crate::store::Store;

#[derive(Debug, Default)]
struct Namespaces {
    gauges: BTreeMap<String, f64>,
    counters: BTreeMap<String, i64>,
}

#[derive(Debug, Default)]
pub struct EphemeralStore {
    inner: RwLock<Namespaces>,
}

impl EphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.gauges.len() + inner.counters.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Store for EphemeralStore {
    async fn update(&self, metric: &Metric) -> Result<(), StoreError> {
        metric.validate()?;
        let mut inner = self.inner.write().await;
        match metric.value {
            MetricValue::Gauge(value) => {
                inner.gauges.insert(metric.id.clone(), value);
            }
            MetricValue::Counter(delta) => {
                let total = inner.counters.entry(metric.id.clone()).or_insert(0);
                *total = total.wrapping_add(delta);
            }
        }
        Ok(())
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<(), StoreError> {
        for (applied, metric) in metrics.iter().enumerate() {
            if let Err(e) = self.update(metric).await {
                debug!(
                    "Batch update stopped at element {applied} of {}, earlier elements stay applied",
                    metrics.len()
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn get(&self, kind: MetricKind, id: &str) -> Result<Metric, StoreError> {
        let inner = self.inner.read().await;
        let value = match kind {
            MetricKind::Gauge => inner.gauges.get(id).copied().map(MetricValue::Gauge),
            MetricKind::Counter => inner.counters.get(id).copied().map(MetricValue::Counter),
        };
        value
            .map(|value| Metric {
                id: id.to_string(),
                value,
            })
            .ok_or_else(|| StoreError::not_found(kind, id))
    }

    async fn all(&self) -> Result<Vec<Metric>, StoreError> {
        let inner = self.inner.read().await;
        let gauges = inner
            .gauges
            .iter()
            .map(|(id, value)| Metric::gauge(id.as_str(), *value));
        let counters = inner
            .counters
            .iter()
            .map(|(id, delta)| Metric::counter(id.as_str(), *delta));
        Ok(gauges.chain(counters).collect())
    }

    async fn restore(&self, metrics: Vec<Metric>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for metric in metrics {
            metric.validate()?;
            match metric.value {
                MetricValue::Gauge(value) => {
                    inner.gauges.insert(metric.id, value);
                }
                MetricValue::Counter(delta) => {
                    inner.counters.insert(metric.id, delta);
                }
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.gauges.clear();
        inner.counters.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_gauge_last_write_wins() {
        let store = EphemeralStore::new();
        for value in [1.0, 2.5, -3.0, 42.5] {
            store.update(&Metric::gauge("cpu_load", value)).await.unwrap();
        }
        assert_eq!(
            store.get(MetricKind::Gauge, "cpu_load").await.unwrap(),
            Metric::gauge("cpu_load", 42.5)
        );
    }

    #[tokio::test]
    async fn test_counter_accumulates() {
        let store = EphemeralStore::new();
        store.update(&Metric::counter("requests", 10)).await.unwrap();
        store.update(&Metric::counter("requests", 10)).await.unwrap();
        assert_eq!(
            store.get(MetricKind::Counter, "requests").await.unwrap(),
            Metric::counter("requests", 20)
        );
    }

    #[tokio::test]
    async fn test_namespaces_are_separate() {
        let store = EphemeralStore::new();
        store.update(&Metric::gauge("x", 1.5)).await.unwrap();
        store.update(&Metric::counter("x", 3)).await.unwrap();
        assert_eq!(
            store.get(MetricKind::Gauge, "x").await.unwrap().value,
            MetricValue::Gauge(1.5)
        );
        assert_eq!(
            store.get(MetricKind::Counter, "x").await.unwrap().value,
            MetricValue::Counter(3)
        );
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = EphemeralStore::new();
        store.update(&Metric::gauge("cpu_load", 1.0)).await.unwrap();
        let err = store.get(MetricKind::Counter, "cpu_load").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: MetricKind::Counter, .. }));
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected() {
        let store = EphemeralStore::new();
        let err = store.update(&Metric::gauge("", 1.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_batch_is_not_transactional() {
        let store = EphemeralStore::new();
        let batch = vec![
            Metric::gauge("applied", 1.0),
            Metric::counter("", 1),
            Metric::gauge("skipped", 2.0),
        ];
        assert!(store.update_batch(&batch).await.is_err());
        assert!(store.get(MetricKind::Gauge, "applied").await.is_ok());
        assert!(store.get(MetricKind::Gauge, "skipped").await.is_err());
    }

    #[tokio::test]
    async fn test_restore_sets_counters_absolutely() {
        let store = EphemeralStore::new();
        store.update(&Metric::counter("requests", 5)).await.unwrap();
        store
            .restore(vec![Metric::counter("requests", 20), Metric::gauge("g", 0.5)])
            .await
            .unwrap();
        assert_eq!(
            store.get(MetricKind::Counter, "requests").await.unwrap(),
            Metric::counter("requests", 20)
        );
    }

    #[tokio::test]
    async fn test_all_is_ordered_and_clear_empties() {
        let store = EphemeralStore::new();
        store.update(&Metric::counter("b", 1)).await.unwrap();
        store.update(&Metric::gauge("z", 1.0)).await.unwrap();
        store.update(&Metric::gauge("a", 2.0)).await.unwrap();
        assert_eq!(
            store.all().await.unwrap(),
            vec![
                Metric::gauge("a", 2.0),
                Metric::gauge("z", 1.0),
                Metric::counter("b", 1),
            ]
        );
        store.clear().await.unwrap();
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counter_updates_are_not_lost() {
        let store = Arc::new(EphemeralStore::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                for _ in 0..250 {
                    store.update(&Metric::counter("hits", 1)).await.unwrap();
                    store.update(&Metric::gauge("noise", 1.0)).await.unwrap();
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert_eq!(
            store.get(MetricKind::Counter, "hits").await.unwrap(),
            Metric::counter("hits", 4000)
        );
    }
}
