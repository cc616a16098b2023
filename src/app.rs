//! The main application logic, decoupled from the entry point.

use crate::{
    collector::Collector,
    config::{log_task_summary, Config},
    core::{MetricsSink, StatsSource},
    influx::{CredentialSource, EnvCredentials, InfluxWriter},
    internal_metrics::{LoggingRecorder, Metrics},
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// A handle to the running application, owning every collector task.
pub struct App {
    task_manager: TaskManager,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Number of background tasks that were started.
    pub fn task_count(&self) -> usize {
        self.task_manager.len()
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received. Waiting for collectors to stop...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the collectors from running them, and lets tests
/// swap the database sink, the container runtime and the credentials.
pub struct AppBuilder {
    config: Config,
    sink_override: Option<Arc<dyn MetricsSink>>,
    stats_source_override: Option<Arc<dyn StatsSource>>,
    credentials_override: Option<Arc<dyn CredentialSource>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sink_override: None,
            stats_source_override: None,
            credentials_override: None,
        }
    }

    /// Overrides the database sink for testing.
    pub fn sink_override(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    /// Overrides the container runtime used by every docker task.
    pub fn stats_source_override(mut self, source: Arc<dyn StatsSource>) -> Self {
        self.stats_source_override = Some(source);
        self
    }

    /// Overrides where the database writer reads its credentials from.
    /// Ignored when the sink itself is overridden.
    pub fn credentials_override(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials_override = Some(credentials);
        self
    }

    /// Validates the tasks and spawns one collector per task.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        let tasks = config.tasks()?;

        if config.log_metrics {
            let interval = Duration::from_secs(config.log_metrics_interval_seconds.max(1));
            let recorder = LoggingRecorder::new(interval, &task_manager);
            if metrics::set_global_recorder(recorder).is_err() {
                warn!("A metrics recorder is already installed, internal metrics will not be logged");
            } else {
                Metrics::describe();
            }
        }

        let sink = match self.sink_override {
            Some(sink) => sink,
            None => {
                let credentials = self
                    .credentials_override
                    .unwrap_or_else(|| Arc::new(EnvCredentials));
                let writer = InfluxWriter::new(credentials)
                    .context("failed to build the database client")?;
                Arc::new(writer) as Arc<dyn MetricsSink>
            }
        };

        let collectors = tasks.len();
        for task in tasks {
            log_task_summary(&task);
            let name = task.name.clone();
            let collector = Collector::new(task, sink.clone(), self.stats_source_override.clone())
                .with_context(|| format!("failed to start task {}", name))?;
            let rx = task_manager.get_shutdown_rx();
            task_manager.spawn(name, collector.run(rx));
        }

        info!("Started {} collector tasks", collectors);
        Ok(App { task_manager })
    }
}
