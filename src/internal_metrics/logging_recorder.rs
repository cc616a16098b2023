//! A metrics recorder that periodically logs all captured metrics.

use crate::task_manager::TaskManager;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// A metrics recorder that keeps metrics in memory and logs them with
/// `tracing::info!` at a fixed interval.
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl LoggingRecorder {
    /// Creates a new `LoggingRecorder` and spawns the task that logs the
    /// snapshots. The task stops on the manager's shutdown signal.
    pub fn new(interval: Duration, task_manager: &TaskManager) -> Self {
        let registry = Arc::new(Registry::new(AtomicStorage));
        let recorder = Self {
            registry: registry.clone(),
        };

        let mut shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("MetricsLogger", async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; nothing has been recorded yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Metrics logging task received shutdown signal.");
                        break;
                    }
                    _ = ticker.tick() => log_snapshot(&registry),
                }
            }
        });

        recorder
    }
}

fn log_snapshot(registry: &Registry<Key, AtomicStorage>) {
    tracing::debug!("--- Metrics Snapshot ---");

    let mut counters: Vec<_> = registry.get_counter_handles().into_iter().collect();
    counters.sort_by(|a, b| a.0.name().cmp(b.0.name()));
    for (key, counter) in counters {
        tracing::info!("[Counter] {}: {}", key, counter.load(Ordering::Relaxed));
    }

    for (key, gauge) in registry.get_gauge_handles() {
        let value = f64::from_bits(gauge.load(Ordering::Relaxed));
        tracing::info!("[Gauge] {}: {}", key, value);
    }

    for (key, histogram) in registry.get_histogram_handles() {
        // Draining keeps the bucket from growing without bound.
        let mut count = 0usize;
        let mut sum = 0.0f64;
        histogram.clear_with(|values| {
            count += values.len();
            sum += values.iter().sum::<f64>();
        });
        if count > 0 {
            tracing::info!(
                "[Histogram] {}: count={} mean={:.4}",
                key,
                count,
                sum / count as f64
            );
        }
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry
            .get_or_create_counter(key, |c| Counter::from_arc(c.clone()))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry
            .get_or_create_gauge(key, |g| Gauge::from_arc(g.clone()))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry
            .get_or_create_histogram(key, |h| Histogram::from_arc(h.clone()))
    }
}
