//! Docker Engine API payloads, reduced to the fields the collector reads.

use crate::stats::{BlockIoEntry, NetworkCounters, RawStatsSnapshot};
use serde::Deserialize;
use std::collections::HashMap;

/// An entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// The container's primary name without the leading `/`, or its short id
    /// when the runtime reports no name.
    pub fn display_name(&self) -> String {
        match self.names.first() {
            Some(name) => name.trim_start_matches('/').to_string(),
            None => self.id.chars().take(12).collect(),
        }
    }
}

/// The body of `GET /containers/{id}/stats?stream=false`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DockerStats {
    pub name: String,
    pub id: String,
    pub cpu_stats: CpuStats,
    pub precpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
    pub networks: Option<HashMap<String, NetworkStats>>,
    pub blkio_stats: BlkioStats,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CpuUsage {
    pub total_usage: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    pub limit: Option<u64>,
    pub stats: Option<MemoryDetail>,
}

/// Cgroup memory breakdown. cgroup v2 reports `inactive_file`, cgroup v1
/// reports `total_inactive_file`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryDetail {
    pub inactive_file: Option<u64>,
    pub total_inactive_file: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlkioStats {
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

impl DockerStats {
    /// The counters of this reading.
    pub fn snapshot(&self) -> RawStatsSnapshot {
        let inactive_file = self
            .memory_stats
            .stats
            .as_ref()
            .and_then(|d| d.inactive_file.or(d.total_inactive_file))
            .unwrap_or(0);

        let mut networks: Vec<(&String, &NetworkStats)> =
            self.networks.iter().flatten().collect();
        networks.sort_by(|a, b| a.0.cmp(b.0));

        RawStatsSnapshot {
            total_cpu_usage: self.cpu_stats.cpu_usage.total_usage,
            system_cpu_usage: self.cpu_stats.system_cpu_usage.unwrap_or(0),
            online_cpus: self.cpu_stats.online_cpus.unwrap_or(0),
            memory_usage: self.memory_stats.usage.unwrap_or(0),
            memory_limit: self.memory_stats.limit.unwrap_or(0),
            inactive_file,
            networks: networks
                .into_iter()
                .map(|(_, n)| NetworkCounters {
                    rx_bytes: n.rx_bytes,
                    tx_bytes: n.tx_bytes,
                })
                .collect(),
            block_io: self
                .blkio_stats
                .io_service_bytes_recursive
                .iter()
                .flatten()
                .map(|e| BlockIoEntry {
                    op: e.op.clone(),
                    value: e.value,
                })
                .collect(),
        }
    }

    /// The CPU counters of the reading the runtime took just before this one,
    /// if it reported any. One-shot reads leave `precpu_stats` zeroed.
    pub fn previous_snapshot(&self) -> Option<RawStatsSnapshot> {
        let pre = &self.precpu_stats;
        match pre.system_cpu_usage {
            Some(system) if system > 0 => Some(RawStatsSnapshot {
                total_cpu_usage: pre.cpu_usage.total_usage,
                system_cpu_usage: system,
                online_cpus: pre.online_cpus.unwrap_or(0),
                ..Default::default()
            }),
            _ => None,
        }
    }
}
