//! The per-task collection loop.
//!
//! A [`Collector`] owns everything one task needs: its source client, the
//! sink, and (in docker mode) the last counters seen per container. Each
//! cycle fetches, turns the data into points, drops blank fields, encodes
//! what is left and writes it. Any failure ends the cycle early; the loop
//! always waits for the next interval and tries again.

use crate::core::{FieldSet, MetricsSink, StatsSource, TaskSource, TaskSpec};
use crate::docker::{DockerClient, DockerError};
use crate::extract::extract_with;
use crate::internal_metrics::Metrics;
use crate::line_protocol;
use crate::stats::{self, RawStatsSnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

const SOURCE_TIMEOUT: Duration = Duration::from_secs(3);

/// Reasons a cycle could not obtain its data.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("non-2xx response: {status}, body: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("container runtime error: {0}")]
    Docker(#[from] DockerError),
}

/// What a single cycle achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The source could not be read; nothing was written.
    FetchFailed,
    /// The source was read. `skipped` counts points that were empty after
    /// filtering or rejected by the sink, plus containers whose statistics
    /// could not be read.
    Completed { written: usize, skipped: usize },
}

/// One line to be written, before filtering and encoding.
#[derive(Debug)]
struct Point {
    tags: Vec<(&'static str, String)>,
    fields: FieldSet,
}

struct HttpSource {
    client: reqwest::Client,
    url: String,
    fields: Vec<crate::core::FieldQuery>,
}

impl HttpSource {
    async fn collect(&self) -> Result<FieldSet, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.bytes().await?;
        let document: serde_json::Value = serde_json::from_slice(&body)?;

        Ok(self
            .fields
            .iter()
            .map(|query| {
                let value = match &query.path {
                    Some(path) => extract_with(&document, path),
                    None => String::new(),
                };
                (query.name.clone(), value)
            })
            .collect())
    }
}

struct DockerSource {
    stats: Arc<dyn StatsSource>,
    /// Last counters seen per container id.
    previous: HashMap<String, RawStatsSnapshot>,
}

impl DockerSource {
    /// Lists running containers and derives one point per container. A
    /// container whose statistics cannot be read is logged and left out;
    /// the number of such containers is returned alongside the points.
    async fn collect(
        &mut self,
        task: &str,
        metrics: &Metrics,
    ) -> Result<(Vec<Point>, usize), SourceError> {
        let containers = self.stats.list_containers().await?;
        let running: Vec<_> = containers.into_iter().filter(|c| c.is_running()).collect();
        debug!(task = %task, count = running.len(), "Listed running containers");

        let mut points = Vec::with_capacity(running.len());
        let mut seen = HashMap::with_capacity(running.len());
        let mut unreadable = 0;
        for container in running {
            let name = container.display_name();
            let reading = match self.stats.container_stats(&container.id).await {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(task = %task, container = %name, error = %e, "Failed to read container stats, skipping container");
                    metrics.cycle_skipped("container");
                    unreadable += 1;
                    continue;
                }
            };

            let current = reading.snapshot();
            // Without any baseline the container reports 0% CPU this cycle.
            let previous = reading
                .previous_snapshot()
                .or_else(|| self.previous.get(&container.id).cloned())
                .unwrap_or_else(|| current.clone());
            let derived = stats::compute(&previous, &current);

            seen.insert(container.id.clone(), current);
            points.push(Point {
                tags: vec![("container", name)],
                fields: derived.into_fields(),
            });
        }

        // Containers that stopped are forgotten.
        self.previous = seen;
        Ok((points, unreadable))
    }
}

enum Source {
    Http(HttpSource),
    Docker(DockerSource),
}

/// Runs the cycles of one task.
pub struct Collector {
    name: String,
    interval: Duration,
    store_blank: bool,
    database_url: String,
    source: Source,
    sink: Arc<dyn MetricsSink>,
    metrics: Metrics,
}

impl Collector {
    /// Builds the collector for `task`.
    ///
    /// Docker tasks read from `stats` when given, otherwise from a client
    /// dialing the task's configured endpoint.
    pub fn new(
        task: TaskSpec,
        sink: Arc<dyn MetricsSink>,
        stats: Option<Arc<dyn StatsSource>>,
    ) -> Result<Self, SourceError> {
        let source = match task.source {
            TaskSource::Http { url, fields } => {
                let client = reqwest::Client::builder()
                    .danger_accept_invalid_certs(true)
                    .timeout(SOURCE_TIMEOUT)
                    .build()?;
                Source::Http(HttpSource {
                    client,
                    url,
                    fields,
                })
            }
            TaskSource::DockerStats { endpoint } => {
                let stats = match stats {
                    Some(stats) => stats,
                    None => Arc::new(DockerClient::new(&endpoint)?) as Arc<dyn StatsSource>,
                };
                Source::Docker(DockerSource {
                    stats,
                    previous: HashMap::new(),
                })
            }
        };

        Ok(Self {
            metrics: Metrics::for_task(&task.name),
            name: task.name,
            interval: task.interval,
            store_blank: task.store_blank,
            database_url: task.database_url,
            source,
            sink,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs cycles until the shutdown signal fires. The first cycle starts
    /// immediately; an in-flight cycle is abandoned on shutdown.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(task = %self.name, "Collector started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = self.run_cycle() => {}
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(task = %self.name, "Collector received shutdown signal.");
    }

    /// Performs a single fetch, encode and write cycle.
    #[instrument(skip(self), fields(task = %self.name))]
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.metrics.cycle_started();

        let collected = match &mut self.source {
            Source::Http(http) => http.collect().await.map(|fields| {
                let point = Point {
                    tags: Vec::new(),
                    fields,
                };
                (vec![point], 0)
            }),
            Source::Docker(docker) => docker.collect(&self.name, &self.metrics).await,
        };

        let (points, mut skipped) = match collected {
            Ok(collected) => collected,
            Err(e) => {
                warn!(task = %self.name, error = %e, "Fetch failed, skipping cycle");
                self.metrics.cycle_skipped("fetch");
                return CycleOutcome::FetchFailed;
            }
        };

        let mut written = 0;
        for point in points {
            if self.write_point(point).await {
                written += 1;
            } else {
                skipped += 1;
            }
        }
        CycleOutcome::Completed { written, skipped }
    }

    /// Filters, encodes and writes one point. Returns whether it was stored.
    async fn write_point(&self, point: Point) -> bool {
        let (fields, dropped) = point.fields.filter_blank(self.store_blank);
        if !dropped.is_empty() {
            debug!(task = %self.name, fields = ?dropped, "Skipping blank or zero fields");
            self.metrics.fields_skipped(dropped.len());
        }
        if fields.is_empty() {
            info!(task = %self.name, "No fields to write, skipping");
            self.metrics.cycle_skipped("empty");
            return false;
        }

        let tags: Vec<(&str, &str)> = point.tags.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let line = line_protocol::encode(&self.name, &tags, &fields);
        info!(task = %self.name, "INSERT : [{}]", line);

        let started = Instant::now();
        match self.sink.write(&self.database_url, &line).await {
            Ok(()) => {
                self.metrics.write_succeeded(started.elapsed());
                true
            }
            Err(e) => {
                warn!(task = %self.name, error = %e, "Write failed");
                self.metrics.write_failed(started.elapsed());
                self.metrics.cycle_skipped("write");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldQuery;
    use crate::docker::{ContainerSummary, DockerStats};
    use crate::influx::WriteError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<(String, String)>>,
        reject: bool,
    }

    impl RecordingSink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
        }
    }

    #[async_trait]
    impl MetricsSink for RecordingSink {
        async fn write(&self, endpoint: &str, line: &str) -> Result<(), WriteError> {
            self.lines
                .lock()
                .unwrap()
                .push((endpoint.to_string(), line.to_string()));
            if self.reject {
                return Err(WriteError::Rejected {
                    status: 400,
                    body: "bad line".into(),
                });
            }
            Ok(())
        }
    }

    struct FakeStats {
        containers: Vec<ContainerSummary>,
        readings: HashMap<String, DockerStats>,
    }

    #[async_trait]
    impl StatsSource for FakeStats {
        async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError> {
            Ok(self.containers.clone())
        }

        async fn container_stats(&self, id: &str) -> Result<DockerStats, DockerError> {
            self.readings.get(id).cloned().ok_or(DockerError::Status {
                status: 404,
                body: "no such container".into(),
            })
        }
    }

    fn container(id: &str, name: &str, state: &str) -> ContainerSummary {
        serde_json::from_value(json!({
            "Id": id,
            "Names": [format!("/{}", name)],
            "State": state,
            "Status": "Up",
        }))
        .unwrap()
    }

    fn reading(total: u64, system: u64) -> DockerStats {
        serde_json::from_value(json!({
            "cpu_stats": {
                "cpu_usage": { "total_usage": total },
                "system_cpu_usage": system,
                "online_cpus": 2
            },
            "precpu_stats": { "cpu_usage": { "total_usage": 0 } },
            "memory_stats": {
                "usage": 2097152u64,
                "limit": 8388608u64,
                "stats": { "inactive_file": 1048576u64 }
            },
            "networks": { "eth0": { "rx_bytes": 100, "tx_bytes": 200 } },
            "blkio_stats": {
                "io_service_bytes_recursive": [
                    { "op": "Read", "value": 4096 },
                    { "op": "Write", "value": 8192 }
                ]
            }
        }))
        .unwrap()
    }

    fn http_task(url: String, fields: &[(&str, &str)], store_blank: bool) -> TaskSpec {
        TaskSpec {
            name: "sensor".into(),
            interval: Duration::from_millis(50),
            store_blank,
            database_url: "http://db/write?db=home".into(),
            source: TaskSource::Http {
                url,
                fields: fields.iter().map(|(n, e)| FieldQuery::new(*n, *e)).collect(),
            },
        }
    }

    fn docker_task() -> TaskSpec {
        TaskSpec {
            name: "containers".into(),
            interval: Duration::from_millis(50),
            store_blank: false,
            database_url: "http://db/write?db=home".into(),
            source: TaskSource::DockerStats {
                endpoint: "unix:///nonexistent.sock".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_http_cycle_writes_filtered_line() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "a": 1.5, "b": "x", "c": "0"
            })))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(
            format!("{}/status", server.uri()),
            &[("a", "$.a"), ("b", "$.b"), ("c", "$.c")],
            false,
        );
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        // Act
        let outcome = collector.run_cycle().await;

        // Assert
        assert_eq!(outcome, CycleOutcome::Completed { written: 1, skipped: 0 });
        assert_eq!(sink.lines(), vec!["sensor a=1.5,b=\"x\"".to_string()]);
        let endpoints: Vec<String> = sink.lines.lock().unwrap().iter().map(|(e, _)| e.clone()).collect();
        assert_eq!(endpoints, vec!["http://db/write?db=home".to_string()]);
    }

    #[tokio::test]
    async fn test_http_cycle_sanitizes_field_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "load": 0.25 })))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(server.uri(), &[("cpu-load", "$.load")], false);
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        collector.run_cycle().await;

        assert_eq!(sink.lines(), vec!["sensor cpu_load=0.25".to_string()]);
    }

    #[tokio::test]
    async fn test_http_500_skips_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(server.uri(), &[("a", "$.a")], false);
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        let outcome = collector.run_cycle().await;

        assert_eq!(outcome, CycleOutcome::FetchFailed);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_skips_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(server.uri(), &[("a", "$.a")], false);
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        assert_eq!(collector.run_cycle().await, CycleOutcome::FetchFailed);
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_all_blank_fields_skip_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "a": 0, "b": "" })))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(server.uri(), &[("a", "$.a"), ("b", "$.b"), ("missing", "$.nope")], false);
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        let outcome = collector.run_cycle().await;

        assert_eq!(outcome, CycleOutcome::Completed { written: 0, skipped: 1 });
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn test_store_blank_keeps_zero_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "a": 0, "b": "" })))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(server.uri(), &[("a", "$.a"), ("b", "$.b")], true);
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        collector.run_cycle().await;

        assert_eq!(sink.lines(), vec!["sensor a=0,b=\"\"".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_write_counts_as_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "a": 3 })))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink {
            reject: true,
            ..Default::default()
        });
        let task = http_task(server.uri(), &[("a", "$.a")], false);
        let mut collector = Collector::new(task, sink.clone(), None).unwrap();

        let outcome = collector.run_cycle().await;

        assert_eq!(outcome, CycleOutcome::Completed { written: 0, skipped: 1 });
        assert_eq!(sink.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_docker_cycle_writes_one_line_per_running_container() {
        // Arrange
        let stats = Arc::new(FakeStats {
            containers: vec![
                container("aaa", "web", "running"),
                container("bbb", "db", "running"),
                container("ccc", "old", "exited"),
            ],
            readings: HashMap::from([("aaa".to_string(), reading(400, 1000))]),
        });
        let sink = Arc::new(RecordingSink::default());
        let mut collector = Collector::new(docker_task(), sink.clone(), Some(stats)).unwrap();

        // Act
        let outcome = collector.run_cycle().await;

        // Assert: "db" has no reading and is skipped, "old" is not running.
        assert_eq!(outcome, CycleOutcome::Completed { written: 1, skipped: 1 });
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "containers,container=web memory_usage_mb=1.0,memory_limit_mb=8.0,memory_percent=12.5,\
             network_rx_bytes=100,network_tx_bytes=200,block_read_bytes=4096,block_write_bytes=8192"
        );
    }

    #[tokio::test]
    async fn test_docker_cycle_uses_cached_snapshot_for_cpu() {
        let stats = Arc::new(FakeStats {
            containers: vec![container("aaa", "web", "running")],
            readings: HashMap::from([("aaa".to_string(), reading(400, 1000))]),
        });
        let sink = Arc::new(RecordingSink::default());
        let mut collector =
            Collector::new(docker_task(), sink.clone(), Some(stats.clone() as Arc<dyn StatsSource>)).unwrap();
        collector.run_cycle().await;

        // Second reading: 100 more CPU units out of 1000 system units on 2 CPUs.
        let Source::Docker(docker) = &mut collector.source else {
            panic!("expected docker source");
        };
        docker.stats = Arc::new(FakeStats {
            containers: vec![container("aaa", "web", "running")],
            readings: HashMap::from([("aaa".to_string(), reading(500, 2000))]),
        });
        collector.run_cycle().await;

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("containers,container=web cpu_percent=20.0,"));
    }

    #[tokio::test]
    async fn test_run_polls_until_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let sink = Arc::new(RecordingSink::default());
        let task = http_task(server.uri(), &[("a", "$.a")], false);
        let collector = Collector::new(task, sink.clone(), None).unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(collector.run(rx));
        tokio::time::sleep(Duration::from_millis(180)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("collector should stop")
            .unwrap();

        // The failing source was polled repeatedly and nothing was written.
        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() >= 2, "expected repeated polls, got {}", requests.len());
        assert!(sink.lines().is_empty());
    }
}
