#![allow(dead_code)]
use async_trait::async_trait;
use scrape::core::StatsSource;
use scrape::docker::{ContainerSummary, DockerError, DockerStats};
use serde_json::json;
use std::collections::HashMap;

/// A container runtime with a fixed set of containers and readings.
#[derive(Debug, Default)]
pub struct StaticStats {
    containers: Vec<ContainerSummary>,
    readings: HashMap<String, DockerStats>,
}

impl StaticStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container. `reading` of `None` makes its stats request fail.
    pub fn with_container(mut self, id: &str, name: &str, state: &str, reading: Option<DockerStats>) -> Self {
        self.containers.push(
            serde_json::from_value(json!({
                "Id": id,
                "Names": [format!("/{}", name)],
                "State": state,
                "Status": "",
            }))
            .unwrap(),
        );
        if let Some(reading) = reading {
            self.readings.insert(id.to_string(), reading);
        }
        self
    }
}

/// A reading with CPU activity since `precpu_stats` and simple memory,
/// network and block-IO counters.
pub fn busy_reading() -> DockerStats {
    serde_json::from_value(json!({
        "cpu_stats": {
            "cpu_usage": { "total_usage": 250_000_000u64 },
            "system_cpu_usage": 2_000_000_000u64,
            "online_cpus": 4
        },
        "precpu_stats": {
            "cpu_usage": { "total_usage": 200_000_000u64 },
            "system_cpu_usage": 1_000_000_000u64,
            "online_cpus": 4
        },
        "memory_stats": {
            "usage": 136314880u64,
            "limit": 536870912u64,
            "stats": { "total_inactive_file": 2097152u64 }
        },
        "networks": {
            "eth0": { "rx_bytes": 1000, "tx_bytes": 2000 },
            "eth1": { "rx_bytes": 24, "tx_bytes": 48 }
        },
        "blkio_stats": {
            "io_service_bytes_recursive": [
                { "major": 8, "minor": 0, "op": "Read", "value": 4096 },
                { "major": 8, "minor": 0, "op": "Write", "value": 8192 },
                { "major": 8, "minor": 0, "op": "Total", "value": 12288 }
            ]
        }
    }))
    .unwrap()
}

#[async_trait]
impl StatsSource for StaticStats {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError> {
        Ok(self.containers.clone())
    }

    async fn container_stats(&self, id: &str) -> Result<DockerStats, DockerError> {
        self.readings.get(id).cloned().ok_or(DockerError::Status {
            status: 404,
            body: format!("No such container: {}", id),
        })
    }
}
