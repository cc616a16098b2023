#![allow(dead_code)]
//! Test helpers for running the full application instance.

use anyhow::Result;
use scrape::{
    app::App,
    config::{Config, InsertConfig},
    core::{MetricsSink, StatsSource},
    influx::CredentialSource,
};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// A running instance of the application.
#[derive(Debug)]
pub struct TestApp {
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: Option<JoinHandle<Result<()>>>,
}

impl TestApp {
    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .expect("Failed to send shutdown signal");

        if let Some(handle) = self.app_handle {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
#[derive(Default)]
pub struct TestAppBuilder {
    pub config: Config,
    sink: Option<Arc<dyn MetricsSink>>,
    stats: Option<Arc<dyn StatsSource>>,
    credentials: Option<Arc<dyn CredentialSource>>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.global.database_url = "http://127.0.0.1:1/write?db=test".to_string();
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_task(mut self, name: &str, entry: InsertConfig) -> Self {
        self.config.insert.insert(name.to_string(), entry);
        self
    }

    pub fn with_database_url(mut self, url: &str) -> Self {
        self.config.global.database_url = url.to_string();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_stats_source(mut self, stats: Arc<dyn StatsSource>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Builds the application and spawns its run loop.
    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = App::builder(self.config);
        if let Some(sink) = self.sink {
            builder = builder.sink_override(sink);
        }
        if let Some(stats) = self.stats {
            builder = builder.stats_source_override(stats);
        }
        if let Some(credentials) = self.credentials {
            builder = builder.credentials_override(credentials);
        }

        let app = builder.build(shutdown_rx).await?;
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            shutdown_tx,
            app_handle: Some(app_handle),
        })
    }
}
