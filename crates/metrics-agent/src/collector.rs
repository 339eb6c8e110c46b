// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic sampling of runtime statistics into the agent's current metric
//! set.
//!
//! Every poll replaces the gauges with a fresh sample, adds a `RandomValue`
//! gauge and publishes the `PollCount` counter. `PollCount` counts sampled
//! keys whose value changed since the previous poll; it only ever grows until
//! [`Collector::clear`] resets it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics_common::Metric;
use rand::Rng;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const RANDOM_VALUE: &str = "RandomValue";
pub const POLL_COUNT: &str = "PollCount";

/// Source of named runtime statistics.
pub trait RuntimeSampler: Send {
    fn sample(&mut self) -> BTreeMap<String, f64>;
}

/// Samples the agent process and its host through `sysinfo`.
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Unable to resolve own pid, process statistics disabled: {e}");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    fn sample_process(&mut self, pid: Pid, stats: &mut BTreeMap<String, f64>) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        let Some(process) = self.system.process(pid) else {
            debug!("Process {pid} not found while sampling");
            return;
        };
        let disk = process.disk_usage();
        stats.insert("ResidentMemory".into(), process.memory() as f64);
        stats.insert("VirtualMemory".into(), process.virtual_memory() as f64);
        stats.insert("ProcessCPUUsage".into(), f64::from(process.cpu_usage()));
        stats.insert("ProcessRunTime".into(), process.run_time() as f64);
        stats.insert("DiskReadBytes".into(), disk.total_read_bytes as f64);
        stats.insert("DiskWrittenBytes".into(), disk.total_written_bytes as f64);
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeSampler for SystemSampler {
    fn sample(&mut self) -> BTreeMap<String, f64> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mut stats = BTreeMap::new();
        if let Some(pid) = self.pid {
            self.sample_process(pid, &mut stats);
        }

        stats.insert("TotalMemory".into(), self.system.total_memory() as f64);
        stats.insert("UsedMemory".into(), self.system.used_memory() as f64);
        stats.insert("FreeMemory".into(), self.system.free_memory() as f64);
        stats.insert(
            "AvailableMemory".into(),
            self.system.available_memory() as f64,
        );
        stats.insert("TotalSwap".into(), self.system.total_swap() as f64);
        stats.insert("UsedSwap".into(), self.system.used_swap() as f64);
        stats.insert(
            "CPUutilization".into(),
            f64::from(self.system.global_cpu_usage()),
        );
        for (index, cpu) in self.system.cpus().iter().enumerate() {
            stats.insert(
                format!("CPUutilization{}", index + 1),
                f64::from(cpu.cpu_usage()),
            );
        }
        stats.insert("CPUCount".into(), self.system.cpus().len() as f64);

        let load = System::load_average();
        stats.insert("LoadAverage1".into(), load.one);
        stats.insert("LoadAverage5".into(), load.five);
        stats.insert("LoadAverage15".into(), load.fifteen);
        stats.insert("Uptime".into(), System::uptime() as f64);
        stats
    }
}

/// The agent's current metric set, shared between the collector that writes
/// it and the reporter that reads it.
#[derive(Debug, Clone, Default)]
pub struct AgentMetrics {
    inner: Arc<RwLock<Vec<Metric>>>,
}

impl AgentMetrics {
    /// Copy of the current set, safe to serialize while polling goes on.
    pub async fn snapshot(&self) -> Vec<Metric> {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, metrics: Vec<Metric>) {
        *self.inner.write().await = metrics;
    }
}

pub struct Collector<S> {
    sampler: S,
    metrics: AgentMetrics,
    previous: Option<BTreeMap<String, f64>>,
    poll_count: i64,
}

impl<S: RuntimeSampler> Collector<S> {
    pub fn new(sampler: S, metrics: AgentMetrics) -> Self {
        Self {
            sampler,
            metrics,
            previous: None,
            poll_count: 0,
        }
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.metrics
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// Takes one sample and publishes the resulting metric set.
    pub async fn poll(&mut self) {
        let mut sample = self.sampler.sample();
        sample.retain(|id, value| {
            if value.is_finite() {
                return true;
            }
            debug!("Dropping non-finite sample {id}: {value}");
            false
        });

        if let Some(previous) = &self.previous {
            let changed = sample
                .iter()
                .filter(|(id, value)| previous.get(id.as_str()) != Some(*value))
                .count();
            self.poll_count = self.poll_count.wrapping_add(changed as i64);
        }

        let mut metrics: Vec<Metric> = sample
            .iter()
            .map(|(id, value)| Metric::gauge(id.as_str(), *value))
            .collect();
        metrics.push(Metric::gauge(RANDOM_VALUE, rand::rng().random::<f64>()));
        metrics.push(Metric::counter(POLL_COUNT, self.poll_count));

        debug!(
            "Sampled {} runtime statistics, poll count {}",
            sample.len(),
            self.poll_count
        );
        self.previous = Some(sample);
        self.metrics.replace(metrics).await;
    }

    /// Forgets the previous sample and resets the poll count.
    pub async fn clear(&mut self) {
        self.previous = None;
        self.poll_count = 0;
        self.metrics.replace(Vec::new()).await;
    }

    /// Polls once per `interval` until `cancel` fires.
    pub async fn run(&mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Sampling runtime statistics every {interval:?}");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Collector stopped");
                    return;
                }
                _ = ticker.tick() => self.poll().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_common::{MetricKind, MetricValue};
    use std::collections::VecDeque;

    /// Hands out scripted samples, repeating the last one when exhausted.
    struct ScriptedSampler {
        samples: VecDeque<Vec<(&'static str, f64)>>,
        last: BTreeMap<String, f64>,
    }

    impl ScriptedSampler {
        fn new(samples: Vec<Vec<(&'static str, f64)>>) -> Self {
            Self {
                samples: samples.into(),
                last: BTreeMap::new(),
            }
        }
    }

    impl RuntimeSampler for ScriptedSampler {
        fn sample(&mut self) -> BTreeMap<String, f64> {
            if let Some(next) = self.samples.pop_front() {
                self.last = next
                    .into_iter()
                    .map(|(id, value)| (id.to_string(), value))
                    .collect();
            }
            self.last.clone()
        }
    }

    fn find(metrics: &[Metric], kind: MetricKind, id: &str) -> Option<MetricValue> {
        metrics
            .iter()
            .find(|m| m.kind() == kind && m.id == id)
            .map(|m| m.value)
    }

    #[tokio::test]
    async fn test_first_poll_publishes_sample_with_extras() {
        let sampler = ScriptedSampler::new(vec![vec![("Alloc", 1024.0), ("HeapSys", 2048.0)]]);
        let mut collector = Collector::new(sampler, AgentMetrics::default());
        collector.poll().await;

        let metrics = collector.metrics().snapshot().await;
        assert_eq!(metrics.len(), 4);
        assert_eq!(
            find(&metrics, MetricKind::Gauge, "Alloc"),
            Some(MetricValue::Gauge(1024.0))
        );
        assert_eq!(
            find(&metrics, MetricKind::Counter, POLL_COUNT),
            Some(MetricValue::Counter(0))
        );
        match find(&metrics, MetricKind::Gauge, RANDOM_VALUE) {
            Some(MetricValue::Gauge(v)) => assert!((0.0..1.0).contains(&v)),
            other => panic!("unexpected random value {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_poll_count_counts_changed_keys() {
        let sampler = ScriptedSampler::new(vec![
            vec![("a", 1.0), ("b", 2.0), ("c", 3.0)],
            vec![("a", 1.0), ("b", 2.0), ("c", 3.0)],
            vec![("a", 1.5), ("b", 2.0), ("c", 4.0), ("d", 0.0)],
        ]);
        let mut collector = Collector::new(sampler, AgentMetrics::default());

        collector.poll().await;
        assert_eq!(collector.poll_count(), 0);
        collector.poll().await;
        assert_eq!(collector.poll_count(), 0);
        collector.poll().await;
        assert_eq!(collector.poll_count(), 3);

        let metrics = collector.metrics().snapshot().await;
        assert_eq!(
            find(&metrics, MetricKind::Counter, POLL_COUNT),
            Some(MetricValue::Counter(3))
        );
        assert_eq!(
            find(&metrics, MetricKind::Gauge, "c"),
            Some(MetricValue::Gauge(4.0))
        );
    }

    #[tokio::test]
    async fn test_poll_count_never_decreases() {
        let samples = (0..20).map(|i| vec![("x", f64::from(i % 3))]).collect();
        let mut collector = Collector::new(ScriptedSampler::new(samples), AgentMetrics::default());
        let mut last = 0;
        for _ in 0..20 {
            collector.poll().await;
            assert!(collector.poll_count() >= last);
            last = collector.poll_count();
        }
        assert_eq!(last, 19);
    }

    #[tokio::test]
    async fn test_non_finite_samples_are_dropped() {
        let sampler = ScriptedSampler::new(vec![vec![("a", 1.0), ("b", f64::NAN), ("c", f64::INFINITY)]]);
        let mut collector = Collector::new(sampler, AgentMetrics::default());
        collector.poll().await;

        let metrics = collector.metrics().snapshot().await;
        assert_eq!(metrics.len(), 3);
        assert!(metrics.iter().all(|m| m.validate().is_ok()));
        assert_eq!(find(&metrics, MetricKind::Gauge, "b"), None);
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let sampler = ScriptedSampler::new(vec![vec![("a", 1.0)], vec![("a", 2.0)]]);
        let mut collector = Collector::new(sampler, AgentMetrics::default());
        collector.poll().await;
        collector.poll().await;
        assert_eq!(collector.poll_count(), 1);

        collector.clear().await;
        assert_eq!(collector.poll_count(), 0);
        assert!(collector.metrics().snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_every_interval_until_cancelled() {
        let sampler = ScriptedSampler::new(vec![
            vec![("a", 1.0)],
            vec![("a", 2.0)],
            vec![("a", 3.0)],
        ]);
        let mut collector = Collector::new(sampler, AgentMetrics::default());
        let cancel = CancellationToken::new();

        let stop = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(6500)).await;
                cancel.cancel();
            }
        };
        tokio::join!(collector.run(Duration::from_secs(2), cancel), stop);

        // Polls at 2s, 4s and 6s, the last two each changing "a".
        assert_eq!(collector.poll_count(), 2);
    }

    #[test]
    fn test_system_sampler_reports_host_memory() {
        let mut sampler = SystemSampler::new();
        let stats = sampler.sample();
        assert!(stats.get("TotalMemory").copied().unwrap_or_default() > 0.0);
        assert!(stats.contains_key("CPUutilization"));
    }
}
