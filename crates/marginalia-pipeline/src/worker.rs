//! Single-consumer pipeline worker.
//!
//! A bounded FIFO channel feeds exactly one consumer task, so no two runs
//! ever execute concurrently, even across sites. Enqueueing never blocks:
//! a saturated queue returns [`EnqueueError::QueueFull`] and the caller
//! marks the run failed at step `enqueue`. Shutdown is cooperative — the
//! in-flight run is never cancelled mid-step; the stop deadline bounds
//! only the wait for it to finish.

use marginalia_core::Config;
use marginalia_state::{RunStep, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::runner::Runner;

pub const DEFAULT_QUEUE_SIZE: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("pipeline queue is full")]
    QueueFull,
    #[error("pipeline worker stopped")]
    WorkerStopped,
}

/// Anything that can accept pipeline runs. The decision handlers depend
/// on this rather than on the concrete worker.
pub trait Enqueuer: Send + Sync {
    fn enqueue_run(
        &self,
        run_id: i64,
        site_key: &str,
        comment_id: Option<&str>,
    ) -> Result<(), EnqueueError>;
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: i64,
    pub site_key: String,
    pub comment_id: Option<String>,
}

pub struct Worker {
    store: Store,
    runner: Runner,
    tx: mpsc::Sender<RunRequest>,
    rx: Mutex<Option<mpsc::Receiver<RunRequest>>>,
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(store: Store, config: Arc<Config>, queue_size: usize) -> Self {
        let queue_size = if queue_size == 0 { DEFAULT_QUEUE_SIZE } else { queue_size };
        let (tx, rx) = mpsc::channel(queue_size);
        let (stop_tx, _) = watch::channel(false);
        Self {
            runner: Runner::new(store.clone(), config),
            store,
            tx,
            rx: Mutex::new(Some(rx)),
            stop_tx,
            stopped: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the consumer task. Calling more than once is a no-op.
    pub fn start(&self) {
        let Some(mut rx) = self.rx.lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };

        let runner = self.runner.clone();
        let store = self.store.clone();
        let mut stop_rx = self.stop_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    request = rx.recv() => {
                        let Some(request) = request else { break };
                        run_one(&runner, &store, request).await;
                    }
                }
            }
            info!("pipeline worker stopped");
        });

        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
        info!("pipeline worker started");
    }

    /// Signal shutdown and wait for the in-flight run to complete, up to
    /// `deadline`. Requests still sitting in the queue are dropped; their
    /// run rows stay `queued`.
    pub async fn stop(&self, deadline: Duration) -> Result<(), tokio::time::error::Elapsed> {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);

        let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            tokio::time::timeout(deadline, async {
                let _ = handle.await;
            })
            .await?;
        }
        Ok(())
    }
}

impl Enqueuer for Worker {
    fn enqueue_run(
        &self,
        run_id: i64,
        site_key: &str,
        comment_id: Option<&str>,
    ) -> Result<(), EnqueueError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EnqueueError::WorkerStopped);
        }

        let request = RunRequest {
            run_id,
            site_key: site_key.to_string(),
            comment_id: comment_id.map(str::to_string),
        };

        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(EnqueueError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::WorkerStopped),
        }
    }
}

async fn run_one(runner: &Runner, store: &Store, request: RunRequest) {
    info!(run_id = request.run_id, site_key = %request.site_key, "run dequeued");
    if let Err(e) = runner.run_existing(request.run_id, &request.site_key).await {
        // The runner already recorded the failing step; this catches
        // failures outside any step (mark_run_failed is sticky, so a
        // precise step annotation is never overwritten).
        error!(run_id = request.run_id, error = %e, "pipeline run failed");
        if let Err(mark_err) =
            store.mark_run_failed(request.run_id, RunStep::Pipeline, &format!("run failed: {e:#}"))
        {
            error!(run_id = request.run_id, error = %mark_err, "failed to record run failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Arc<Config> {
        let toml = r#"
            [server]
            listen = ":0"
            [sqlite]
            path = ":memory:"
        "#;
        Arc::new(toml::from_str(toml).unwrap())
    }

    fn test_worker(queue_size: usize) -> Worker {
        let store = Store::open_in_memory().unwrap();
        Worker::new(store, test_config(), queue_size)
    }

    #[tokio::test]
    async fn enqueue_is_fifo_and_bounded() {
        let worker = test_worker(2);

        worker.enqueue_run(1, "blog", Some("c1")).unwrap();
        worker.enqueue_run(2, "blog", None).unwrap();
        // Capacity 2: the third non-blocking enqueue reports a full queue.
        assert_eq!(
            worker.enqueue_run(3, "blog", None).unwrap_err(),
            EnqueueError::QueueFull
        );
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_rejected() {
        let worker = test_worker(8);
        worker.start();
        worker.stop(Duration::from_secs(5)).await.unwrap();

        assert_eq!(
            worker.enqueue_run(1, "blog", None).unwrap_err(),
            EnqueueError::WorkerStopped
        );
    }

    #[tokio::test]
    async fn stop_without_start_returns_immediately() {
        let worker = test_worker(8);
        worker.stop(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn start_twice_is_safe() {
        let worker = test_worker(8);
        worker.start();
        worker.start();
        worker.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_site_run_is_marked_failed() {
        let store = Store::open_in_memory().unwrap();
        store
            .sync_sites(&[("blog".to_string(), "Blog".to_string())].into())
            .unwrap();
        let site_id = store.site_id_by_key("blog").unwrap().unwrap();
        let run_id = store.create_run(site_id, None).unwrap();

        let worker = Worker::new(store.clone(), test_config(), 8);
        worker.start();
        // "blog" is in the store but not in the (empty) site config, so
        // the run fails before any subprocess is spawned.
        worker.enqueue_run(run_id, "blog", None).unwrap();

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let run = store.get_run(run_id).unwrap().unwrap();
            if run.state == marginalia_state::RunState::Failed {
                assert_eq!(run.step, Some(RunStep::Pipeline));
                worker.stop(Duration::from_secs(5)).await.unwrap();
                return;
            }
        }
        panic!("run was not marked failed in time");
    }
}
