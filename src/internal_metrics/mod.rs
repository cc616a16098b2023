//! # Internal Metrics Module
//!
//! Counters describing what the collectors are doing, recorded through the
//! `metrics` facade.
//!
//! ## Components:
//!
//! - **`Metrics`**: A lightweight, cloneable handle bound to one task. It
//!   provides high-level methods for updating the predefined metrics, all
//!   labelled with the task name.
//!
//! - **`LoggingRecorder`**: (Defined in `logging_recorder.rs`) A recorder that
//!   keeps every metric in memory and periodically logs a snapshot. It is only
//!   installed when `log_metrics` is enabled; otherwise the facade's no-op
//!   recorder swallows all updates.

pub mod logging_recorder;

pub use logging_recorder::LoggingRecorder;

use metrics::{Counter, Histogram, Unit};
use std::time::Duration;

/// Per-task handle to the metrics system.
#[derive(Clone)]
pub struct Metrics {
    task: String,
    cycles_total: Counter,
    fields_skipped_total: Counter,
    writes_total: Counter,
    write_failures_total: Counter,
    write_duration_seconds: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Registers descriptions for all supported metrics with the global
    /// recorder. Call once, after the recorder is installed.
    pub fn describe() {
        metrics::describe_counter!("cycles_total", Unit::Count, "Total number of collection cycles started.");
        metrics::describe_counter!("cycle_skips_total", Unit::Count, "Cycles that ended without a write, labelled by reason.");
        metrics::describe_counter!("fields_skipped_total", Unit::Count, "Fields dropped because their value was blank or zero.");
        metrics::describe_counter!("writes_total", Unit::Count, "Lines accepted by the database.");
        metrics::describe_counter!("write_failures_total", Unit::Count, "Lines the database rejected or that could not be sent.");
        metrics::describe_histogram!("write_duration_seconds", Unit::Seconds, "Time taken by a database write.");
    }

    /// Creates the handle for a task.
    pub fn for_task(task: &str) -> Self {
        let label = task.to_string();
        Self {
            task: label.clone(),
            cycles_total: metrics::counter!("cycles_total", "task" => label.clone()),
            fields_skipped_total: metrics::counter!("fields_skipped_total", "task" => label.clone()),
            writes_total: metrics::counter!("writes_total", "task" => label.clone()),
            write_failures_total: metrics::counter!("write_failures_total", "task" => label.clone()),
            write_duration_seconds: metrics::histogram!("write_duration_seconds", "task" => label),
        }
    }

    pub fn cycle_started(&self) {
        self.cycles_total.increment(1);
    }

    /// Records a cycle (or a container within a cycle) that produced no write.
    pub fn cycle_skipped(&self, reason: &'static str) {
        metrics::counter!("cycle_skips_total", "task" => self.task.clone(), "reason" => reason)
            .increment(1);
    }

    pub fn fields_skipped(&self, count: usize) {
        self.fields_skipped_total.increment(count as u64);
    }

    pub fn write_succeeded(&self, elapsed: Duration) {
        self.writes_total.increment(1);
        self.write_duration_seconds.record(elapsed.as_secs_f64());
    }

    pub fn write_failed(&self, elapsed: Duration) {
        self.write_failures_total.increment(1);
        self.write_duration_seconds.record(elapsed.as_secs_f64());
    }
}
