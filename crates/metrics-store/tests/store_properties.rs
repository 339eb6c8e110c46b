// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use metrics_common::{Metric, MetricKind, RetryPolicy};
use metrics_store::{DurableStore, EphemeralStore, Store};
use proptest::prelude::*;
use sqlx::any::AnyPoolOptions;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

async fn sqlite_store() -> DurableStore {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");
    DurableStore::with_pool(pool, RetryPolicy::none())
}

/// Applies every delta from its own task and returns the stored total.
async fn concurrent_sum(store: Arc<dyn Store>, deltas: Vec<i64>) -> i64 {
    let mut tasks = tokio::task::JoinSet::new();
    for delta in deltas {
        let store = Arc::clone(&store);
        tasks.spawn(async move { store.update(&Metric::counter("requests", delta)).await });
    }
    while let Some(res) = tasks.join_next().await {
        res.expect("task panicked").expect("update failed");
    }
    match store.get(MetricKind::Counter, "requests").await {
        Ok(metric) => match metric.value {
            metrics_common::MetricValue::Counter(total) => total,
            other => panic!("unexpected value {other:?}"),
        },
        Err(e) => panic!("counter missing: {e}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ephemeral_counter_is_the_sum_of_interleaved_deltas(
        deltas in prop::collection::vec(-1_000_000i64..1_000_000, 1..64)
    ) {
        let expected: i64 = deltas.iter().sum();
        let total = runtime().block_on(concurrent_sum(Arc::new(EphemeralStore::new()), deltas));
        prop_assert_eq!(total, expected);
    }

    #[test]
    fn durable_counter_is_the_sum_of_interleaved_deltas(
        deltas in prop::collection::vec(-1_000_000i64..1_000_000, 1..32)
    ) {
        let expected: i64 = deltas.iter().sum();
        let total = runtime().block_on(async {
            concurrent_sum(Arc::new(sqlite_store().await), deltas).await
        });
        prop_assert_eq!(total, expected);
    }

    #[test]
    fn gauge_keeps_the_last_written_value(
        values in prop::collection::vec(-1.0e9f64..1.0e9, 1..32)
    ) {
        let last = *values.last().expect("non-empty");
        let stored = runtime().block_on(async {
            let ephemeral = EphemeralStore::new();
            let durable = sqlite_store().await;
            for value in &values {
                ephemeral.update(&Metric::gauge("cpu_load", *value)).await.expect("update");
                durable.update(&Metric::gauge("cpu_load", *value)).await.expect("update");
            }
            (
                ephemeral.get(MetricKind::Gauge, "cpu_load").await.expect("get"),
                durable.get(MetricKind::Gauge, "cpu_load").await.expect("get"),
            )
        });
        prop_assert_eq!(&stored.0, &Metric::gauge("cpu_load", last));
        prop_assert_eq!(&stored.1, &Metric::gauge("cpu_load", last));
    }
}
