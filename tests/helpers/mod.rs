#![allow(dead_code)]
pub mod app;
pub mod mock_sink;
pub mod mock_stats;

use scrape::config::InsertConfig;
use std::collections::BTreeMap;

/// An HTTP task entry polling `url` every `wait_time` seconds.
pub fn http_entry(url: &str, wait_time: i64, fields: &[(&str, &str)]) -> InsertConfig {
    InsertConfig {
        url: url.to_string(),
        wait_time,
        fields: fields
            .iter()
            .map(|(name, path)| (name.to_string(), path.to_string()))
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    }
}

/// A docker-stats task entry.
pub fn docker_entry(wait_time: i64) -> InsertConfig {
    InsertConfig {
        wait_time,
        docker_stats: true,
        ..Default::default()
    }
}
