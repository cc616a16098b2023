//! Owns every background task: one collector per configured task, plus the
//! optional metrics logger.
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Handles = Vec<(String, JoinHandle<()>)>;

/// Tracks spawned tasks and hands out the shared shutdown signal.
///
/// Tasks are expected to watch the receiver from [`TaskManager::get_shutdown_rx`]
/// and return once it flips to `true`; [`TaskManager::shutdown`] then awaits
/// them all.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Handles>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns `future` on the runtime and records it under `name`.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task_name = %name, "Spawning task");
        let handle = tokio::spawn(future);
        self.lock_handles().push((name, handle));
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Number of tasks spawned and not yet awaited.
    pub fn len(&self) -> usize {
        self.lock_handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking task never holds this lock, so a poisoned guard is still consistent.
    fn lock_handles(&self) -> MutexGuard<'_, Handles> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for all managed tasks to complete and reports the ones that panicked.
    pub async fn shutdown(self) {
        let handles: Handles = self.lock_handles().drain(..).collect();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let (names, joins): (Vec<String>, Vec<JoinHandle<()>>) = handles.into_iter().unzip();
        debug!(tasks = ?names, "Awaiting all tasks.");

        let results = join_all(joins).await;

        let mut panicked = Vec::new();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = %name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name = %name, error = %e, "Task panicked.");
                    panicked.push(name.as_str());
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!("{} tasks panicked: {:?}", panicked.len(), panicked);
        }
    }
}
