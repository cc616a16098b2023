#![allow(dead_code)]
use async_trait::async_trait;
use scrape::core::MetricsSink;
use scrape::influx::WriteError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A sink that records every line it is asked to write.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<(String, String)>>>,
    notifier: Arc<Notify>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    pub async fn wait_for_lines(&self, target: usize, timeout_duration: Duration) {
        let wait_future = async {
            loop {
                let notified = self.notifier.notified();
                if self.writes.lock().unwrap().len() >= target {
                    break;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout_duration, wait_future)
            .await
            .expect("Timed out waiting for writes");
    }
}

#[async_trait]
impl MetricsSink for RecordingSink {
    async fn write(&self, endpoint: &str, line: &str) -> Result<(), WriteError> {
        self.writes
            .lock()
            .unwrap()
            .push((endpoint.to_string(), line.to_string()));
        self.notifier.notify_waiters();
        Ok(())
    }
}
