//! Configuration management for scrape
//!
//! This module defines the `Config` struct loaded from the YAML task file and
//! turns its `insert` entries into validated [`TaskSpec`]s. Settings are
//! layered with `figment`: built-in defaults, the YAML file, `SCRAPE_`
//! environment variables, then command-line arguments.

use crate::cli::Cli;
use crate::core::{FieldQuery, TaskSource, TaskSpec};
use crate::docker::{parse_endpoint, DEFAULT_DOCKER_ENDPOINT};
use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Periodically log internal counters.
    #[serde(default)]
    pub log_metrics: bool,
    /// How often internal counters are logged, in seconds.
    pub log_metrics_interval_seconds: u64,
    /// Settings shared by all tasks.
    pub global: GlobalConfig,
    /// The collection tasks, keyed by task name.
    #[serde(default)]
    pub insert: BTreeMap<String, InsertConfig>,
}

/// Settings shared by all tasks.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GlobalConfig {
    /// Database write endpoint used by tasks that do not set their own.
    #[serde(default)]
    pub database_url: String,
}

/// One entry of the `insert` map, as written in the YAML file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InsertConfig {
    /// JSON endpoint polled by HTTP tasks.
    pub url: String,
    /// Seconds between two polls.
    pub wait_time: i64,
    /// Keep blank and zero values.
    pub store_blank: bool,
    /// Per-task override of `global.database_url`.
    pub database_url: Option<String>,
    /// Field name to JSONPath expression.
    pub fields: BTreeMap<String, String>,
    /// Collect container runtime statistics instead of polling `url`.
    pub docker_stats: bool,
    /// Container runtime endpoint, defaults to the local docker socket.
    pub docker_endpoint: Option<String>,
}

/// Reasons a single task is rejected at startup.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("[{task}] invalid wait time {value}, must be a positive number of seconds")]
    InvalidWaitTime { task: String, value: i64 },

    #[error("[{task}] no url specified")]
    MissingUrl { task: String },

    #[error("[{task}] no fields specified")]
    NoFields { task: String },

    #[error("[{task}] unsupported docker endpoint {endpoint}")]
    InvalidDockerEndpoint { task: String, endpoint: String },
}

impl Config {
    /// Loads the configuration, layering defaults, the YAML file named by
    /// the CLI, `SCRAPE_` environment variables and the CLI arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        if !cli.config.exists() {
            bail!("configuration file {} not found", cli.config.display());
        }
        Self::figment(&cli.config)
            .merge(cli.clone())
            .extract()
            .with_context(|| format!("failed to load configuration from {}", cli.config.display()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            // e.g. SCRAPE_GLOBAL__DATABASE_URL=http://influxdb:8086/write?db=home
            .merge(Env::prefixed("SCRAPE_").split("__"))
    }

    /// Builds the task list. Invalid entries are logged and skipped; it is an
    /// error if no usable task remains.
    pub fn tasks(&self) -> Result<Vec<TaskSpec>> {
        if self.global.database_url.is_empty() {
            bail!("global.database_url must be specified");
        }

        let mut tasks = Vec::new();
        for (name, entry) in &self.insert {
            match entry.to_task(name, &self.global.database_url) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!("Skipping task: {}", e),
            }
        }

        if tasks.is_empty() {
            bail!("no valid tasks found in configuration");
        }
        Ok(tasks)
    }
}

impl InsertConfig {
    /// Validates the entry and resolves it into a task.
    pub fn to_task(&self, name: &str, default_database_url: &str) -> Result<TaskSpec, ConfigError> {
        if self.wait_time <= 0 {
            return Err(ConfigError::InvalidWaitTime {
                task: name.to_string(),
                value: self.wait_time,
            });
        }

        let source = if self.docker_stats {
            let endpoint = self
                .docker_endpoint
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_DOCKER_ENDPOINT.to_string());
            if parse_endpoint(&endpoint).is_err() {
                return Err(ConfigError::InvalidDockerEndpoint {
                    task: name.to_string(),
                    endpoint,
                });
            }
            TaskSource::DockerStats { endpoint }
        } else {
            if self.url.is_empty() {
                return Err(ConfigError::MissingUrl {
                    task: name.to_string(),
                });
            }
            if self.fields.is_empty() {
                return Err(ConfigError::NoFields {
                    task: name.to_string(),
                });
            }
            let fields = self
                .fields
                .iter()
                .map(|(field, expression)| {
                    let query = FieldQuery::new(field, expression);
                    if query.path.is_none() {
                        warn!(task = %name, field = %field, expression = %expression, "Invalid JSONPath, field will always be empty");
                    }
                    query
                })
                .collect();
            TaskSource::Http {
                url: self.url.clone(),
                fields,
            }
        };

        let database_url = self
            .database_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| default_database_url.to_string());

        Ok(TaskSpec {
            name: name.to_string(),
            interval: Duration::from_secs(self.wait_time as u64),
            store_blank: self.store_blank,
            database_url,
            source,
        })
    }
}

/// Logs the resolved settings of a task.
pub fn log_task_summary(task: &TaskSpec) {
    match &task.source {
        TaskSource::Http { url, fields } => {
            let queries: Vec<String> = fields
                .iter()
                .map(|f| format!("{}={}", f.name, f.expression))
                .collect();
            info!("[{}] Source URL: {}", task.name, url);
            info!("[{}] Fields: {}", task.name, queries.join(", "));
        }
        TaskSource::DockerStats { endpoint } => {
            info!("[{}] Docker Endpoint: {}", task.name, endpoint);
        }
    }
    info!("[{}] Mode: {}", task.name, task.mode());
    info!("[{}] Interval: {}s", task.name, task.interval.as_secs());
    info!("[{}] Store Blank: {}", task.name, task.store_blank);
    info!("[{}] Database URL: {}", task.name, task.database_url);
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_metrics: false,
            log_metrics_interval_seconds: 60,
            global: GlobalConfig::default(),
            insert: BTreeMap::new(),
        }
    }
}
