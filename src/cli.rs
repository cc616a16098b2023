//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged on top of
//! the YAML configuration file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Polls JSON endpoints and container statistics and writes them to InfluxDB.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Logging level (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Default database write endpoint for all tasks.
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Periodically log internal counters.
    #[arg(long)]
    pub log_metrics: bool,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config.yaml"),
            log_level: None,
            database_url: None,
            log_metrics: false,
        }
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(url) = &self.database_url {
            let mut global = Dict::new();
            global.insert("database_url".into(), Value::from(url.clone()));
            dict.insert("global".into(), Value::from(global));
        }

        // Only an explicit flag overrides the file.
        if self.log_metrics {
            dict.insert("log_metrics".into(), Value::from(true));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
