//! Derivation of container resource metrics from raw runtime counters.
//!
//! The runtime reports cumulative counters, so CPU usage can only be derived
//! from the difference between two snapshots. Everything here is pure.

use crate::core::FieldSet;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Cumulative byte counters of one network interface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One block-IO accounting entry, e.g. `("Read", 4096)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockIoEntry {
    pub op: String,
    pub value: u64,
}

/// A point-in-time reading of a container's resource counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatsSnapshot {
    /// Cumulative CPU time consumed by the container, in nanoseconds.
    pub total_cpu_usage: u64,
    /// Cumulative CPU time of the host, in nanoseconds.
    pub system_cpu_usage: u64,
    pub online_cpus: u32,
    pub memory_usage: u64,
    pub memory_limit: u64,
    /// Reclaimable page cache included in `memory_usage`.
    pub inactive_file: u64,
    pub networks: Vec<NetworkCounters>,
    pub block_io: Vec<BlockIoEntry>,
}

/// The metrics written for one container per cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub cpu_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_limit_mb: f64,
    pub memory_percent: f64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
}

impl DerivedMetrics {
    pub fn into_fields(self) -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert("cpu_percent", self.cpu_percent);
        fields.insert("memory_usage_mb", self.memory_usage_mb);
        fields.insert("memory_limit_mb", self.memory_limit_mb);
        fields.insert("memory_percent", self.memory_percent);
        fields.insert("network_rx_bytes", self.network_rx_bytes);
        fields.insert("network_tx_bytes", self.network_tx_bytes);
        fields.insert("block_read_bytes", self.block_read_bytes);
        fields.insert("block_write_bytes", self.block_write_bytes);
        fields
    }
}

/// Derives the container metrics from two consecutive snapshots.
pub fn compute(previous: &RawStatsSnapshot, current: &RawStatsSnapshot) -> DerivedMetrics {
    let memory_usage_mb = working_set(current) as f64 / BYTES_PER_MB;
    let memory_limit_mb = current.memory_limit as f64 / BYTES_PER_MB;
    let memory_percent = if memory_limit_mb > 0.0 {
        memory_usage_mb / memory_limit_mb * 100.0
    } else {
        0.0
    };

    let (network_rx_bytes, network_tx_bytes) = current
        .networks
        .iter()
        .fold((0u64, 0u64), |(rx, tx), n| {
            (rx.wrapping_add(n.rx_bytes), tx.wrapping_add(n.tx_bytes))
        });

    let mut block_read_bytes = 0u64;
    let mut block_write_bytes = 0u64;
    for entry in &current.block_io {
        if entry.op.eq_ignore_ascii_case("read") {
            block_read_bytes = block_read_bytes.wrapping_add(entry.value);
        } else if entry.op.eq_ignore_ascii_case("write") {
            block_write_bytes = block_write_bytes.wrapping_add(entry.value);
        }
    }

    DerivedMetrics {
        cpu_percent: cpu_percent(previous, current),
        memory_usage_mb,
        memory_limit_mb,
        memory_percent,
        network_rx_bytes,
        network_tx_bytes,
        block_read_bytes,
        block_write_bytes,
    }
}

/// CPU usage over the interval between the two snapshots, where 100 means
/// one fully used core.
///
/// Returns 0 when there is no meaningful delta yet, which is expected on the
/// first observed cycle of a container.
pub fn cpu_percent(previous: &RawStatsSnapshot, current: &RawStatsSnapshot) -> f64 {
    let cpu_delta = current.total_cpu_usage as i128 - previous.total_cpu_usage as i128;
    let system_delta = current.system_cpu_usage as i128 - previous.system_cpu_usage as i128;

    if system_delta > 0 && cpu_delta >= 0 {
        let cpus = if current.online_cpus == 0 {
            1.0
        } else {
            current.online_cpus as f64
        };
        (cpu_delta as f64 / system_delta as f64) * cpus * 100.0
    } else {
        0.0
    }
}

/// Memory usage excluding reclaimable page cache, in bytes.
///
/// Not clamped: inconsistent runtime counters yield a negative value.
pub fn working_set(snapshot: &RawStatsSnapshot) -> i64 {
    snapshot.memory_usage as i64 - snapshot.inactive_file as i64
}
