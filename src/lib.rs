//! scrape - a telemetry collector for InfluxDB
//!
//! Polls JSON endpoints and container runtime statistics on fixed intervals
//! and writes what it finds to InfluxDB 1.x or 2.x as line protocol.

pub mod app;
pub mod cli;
pub mod collector;
pub mod config;
pub mod core;
pub mod docker;
pub mod extract;
pub mod influx;
pub mod internal_metrics;
pub mod line_protocol;
pub mod stats;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
