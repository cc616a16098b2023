//! Core domain types and service traits for scrape
//!
//! This module defines the task model produced by configuration loading and
//! the trait contracts that let collectors talk to their data sources and to
//! the time-series database.

use crate::docker::{ContainerSummary, DockerError, DockerStats};
use crate::influx::WriteError;
use async_trait::async_trait;
use serde_json_path::JsonPath;
use std::fmt;
use std::time::Duration;

/// A fully validated collection task, created once at startup.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task name, used both as log identifier and as measurement name.
    pub name: String,
    /// Delay between two consecutive cycles.
    pub interval: Duration,
    /// Keep fields whose value is blank or zero.
    pub store_blank: bool,
    /// Database write endpoint for this task.
    pub database_url: String,
    /// Where the data comes from.
    pub source: TaskSource,
}

impl TaskSpec {
    pub fn mode(&self) -> &'static str {
        match self.source {
            TaskSource::Http { .. } => "http",
            TaskSource::DockerStats { .. } => "docker-stats",
        }
    }
}

/// The mode-specific parameters of a task.
#[derive(Debug, Clone)]
pub enum TaskSource {
    /// Poll a JSON document and extract fields from it.
    Http { url: String, fields: Vec<FieldQuery> },
    /// Poll the container runtime statistics API.
    DockerStats { endpoint: String },
}

/// One entry of an HTTP task's extraction plan.
#[derive(Debug, Clone)]
pub struct FieldQuery {
    /// Field name as written to the database (not yet sanitized).
    pub name: String,
    /// The path expression as it appeared in the configuration.
    pub expression: String,
    /// The compiled path, or `None` if the expression failed to parse.
    pub path: Option<JsonPath>,
}

impl FieldQuery {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let path = JsonPath::parse(&expression).ok();
        Self {
            name: name.into(),
            expression,
            path,
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Returns `true` for values that are dropped unless `storeBlank` is set:
    /// the empty string, the literal `"0"`, and numeric zero.
    pub fn is_blank_or_zero(&self) -> bool {
        match self {
            FieldValue::Float(v) => *v == 0.0,
            FieldValue::Integer(v) => *v == 0,
            FieldValue::Text(s) => s.is_empty() || s == "0",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// An insertion-ordered set of named field values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    entries: Vec<(String, FieldValue)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Drops blank and zero-valued fields unless `store_blank` is set.
    ///
    /// Returns the retained set and the names of the fields that were dropped.
    pub fn filter_blank(self, store_blank: bool) -> (FieldSet, Vec<String>) {
        if store_blank {
            return (self, Vec::new());
        }
        let (kept, dropped): (Vec<_>, Vec<_>) = self
            .entries
            .into_iter()
            .partition(|(_, v)| !v.is_blank_or_zero());
        (
            FieldSet { entries: kept },
            dropped.into_iter().map(|(n, _)| n).collect(),
        )
    }
}

impl<K, V> FromIterator<(K, V)> for FieldSet
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Writes encoded lines to the time-series database.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Writes a single encoded line to `endpoint`.
    ///
    /// # Returns
    /// * `Ok(())` if the database acknowledged the write
    /// * `Err` on transport failure, credential problems, or a rejected write
    async fn write(&self, endpoint: &str, line: &str) -> Result<(), WriteError>;
}

/// Reads container listings and statistics from a container runtime.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Lists the containers known to the runtime.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError>;

    /// Takes a single, non-streaming statistics reading for a container.
    async fn container_stats(&self, id: &str) -> Result<DockerStats, DockerError>;
}
