//! Manages the lifecycle of all spawned tasks in the application.
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A critical task stopped while the process was supposed to keep running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFault {
    pub task: &'static str,
    pub reason: String,
}

/// A centralized manager for all spawned tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Reporting critical tasks that stop before shutdown on the fault channel.
/// - Providing a graceful shutdown mechanism by awaiting all tasks.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
    faults: mpsc::UnboundedSender<TaskFault>,
}

impl TaskManager {
    /// Creates a new `TaskManager` and the receiving end of its fault channel.
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> (Self, mpsc::UnboundedReceiver<TaskFault>) {
        let (faults, fault_rx) = mpsc::unbounded_channel();
        let manager = Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
            faults,
        };
        (manager, fault_rx)
    }

    /// Spawns a background task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        self.track(name, handle);
    }

    /// Spawns a task the process cannot run without.
    ///
    /// If it returns an error, or returns at all before shutdown was
    /// requested, a [`TaskFault`] is sent.
    pub fn spawn_critical<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug!(task_name = name, "Spawning critical task");
        let faults = self.faults.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            let reason = match future.await {
                Err(e) => format!("{e:#}"),
                Ok(()) if !*shutdown_rx.borrow() => "exited unexpectedly".to_string(),
                Ok(()) => return,
            };
            error!(task_name = name, reason = %reason, "Critical task failed");
            // The receiver is gone only once the controller has already decided.
            let _ = faults.send(TaskFault { task: name, reason });
        });
        self.track(name, handle);
    }

    fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits for all managed tasks to complete.
    pub async fn shutdown(self) {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect::<Vec<_>>();
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let task_names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        debug!(tasks = ?task_names, "Awaiting all tasks.");

        let results = join_all(handles.into_iter().map(|(_, handle)| handle)).await;

        let mut panicked = Vec::new();
        for (task_name, result) in task_names.into_iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name, "Task shut down gracefully."),
                Err(e) => {
                    error!(task_name, error = %e, "Task panicked during shutdown.");
                    panicked.push(task_name);
                }
            }
        }

        if panicked.is_empty() {
            info!("All tasks shut down gracefully.");
        } else {
            error!(tasks = ?panicked, "{} tasks panicked during shutdown", panicked.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_waits_for_background_tasks() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (manager, _faults) = TaskManager::new(shutdown_rx);
        let finished = Arc::new(AtomicBool::new(false));

        let mut rx = manager.get_shutdown_rx();
        let flag = finished.clone();
        manager.spawn("worker", async move {
            let _ = rx.changed().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });

        shutdown_tx.send(true).unwrap();
        manager.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_critical_task_reports_a_fault() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (manager, mut faults) = TaskManager::new(shutdown_rx);

        manager.spawn_critical("listener", async { Err(anyhow::anyhow!("address in use")) });

        let fault = faults.recv().await.unwrap();
        assert_eq!(fault.task, "listener");
        assert!(fault.reason.contains("address in use"));
    }

    #[tokio::test]
    async fn critical_task_exiting_early_reports_a_fault() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (manager, mut faults) = TaskManager::new(shutdown_rx);

        manager.spawn_critical("listener", async { Ok(()) });

        assert_eq!(faults.recv().await.unwrap().reason, "exited unexpectedly");
    }

    #[tokio::test]
    async fn critical_task_exiting_after_shutdown_is_not_a_fault() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (manager, mut faults) = TaskManager::new(shutdown_rx);

        let mut rx = manager.get_shutdown_rx();
        manager.spawn_critical("listener", async move {
            let _ = rx.changed().await;
            Ok(())
        });

        shutdown_tx.send(true).unwrap();
        manager.clone().shutdown().await;
        drop(manager);
        assert!(faults.recv().await.is_none());
    }
}
