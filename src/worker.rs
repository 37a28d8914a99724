//! Worker pool executing queued replication tasks.
//!
//! Tasks travel over an unbounded tokio channel; each worker takes one task
//! at a time and runs it on the blocking pool, retrying transient failures.
//! A task that exhausts its attempts is abandoned, leaving its group partial
//! for the next reconcile sweep.

use crate::error::{Error, Result};
use crate::hook::TaskDispatcher;
use crate::replication::{ReplicationEngine, ReplicationTask};
use crate::retry::{with_retry_if, RetryConfig};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type SharedSender = Arc<Mutex<Option<UnboundedSender<ReplicationTask>>>>;

/// Sends tasks to a [`WorkerPool`]. Fails once the pool is shut down.
#[derive(Clone)]
pub struct QueueDispatcher {
    sender: SharedSender,
}

impl TaskDispatcher for QueueDispatcher {
    fn dispatch(&self, task: ReplicationTask) -> Result<()> {
        let guard = self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = guard
            .as_ref()
            .ok_or_else(|| Error::Queue("worker pool is shut down".to_string()))?;
        sender
            .send(task)
            .map_err(|e| Error::Queue(format!("failed to enqueue task: {}", e)))
    }
}

pub struct WorkerPool {
    sender: SharedSender,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers (at least one) on the current runtime.
    pub fn start(engine: Arc<ReplicationEngine>, workers: usize, retry: RetryConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    engine.clone(),
                    receiver.clone(),
                    retry.clone(),
                ))
            })
            .collect();

        info!("Started {} replication worker(s)", workers.max(1));
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
            handles,
        }
    }

    pub fn dispatcher(&self) -> QueueDispatcher {
        QueueDispatcher {
            sender: self.sender.clone(),
        }
    }

    /// Stop accepting tasks, drain the queue and wait for every worker.
    pub async fn shutdown(self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!("Replication worker terminated abnormally: {}", e);
            }
        }
        info!("Replication workers stopped");
    }
}

async fn run_worker(
    worker: usize,
    engine: Arc<ReplicationEngine>,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<ReplicationTask>>>,
    retry: RetryConfig,
) {
    loop {
        // Lock only while waiting; release before running the task
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else {
            debug!("Worker {} exiting: queue closed", worker);
            break;
        };
        execute(&engine, &retry, task).await;
    }
}

async fn execute(engine: &Arc<ReplicationEngine>, retry: &RetryConfig, task: ReplicationTask) {
    let name = format!("replicate {}#{}", task.table, task.record_id);

    let result = with_retry_if(
        retry,
        &name,
        || {
            let engine = engine.clone();
            let task = task.clone();
            async move {
                match tokio::task::spawn_blocking(move || engine.run_task(&task)).await {
                    Ok(result) => result,
                    Err(e) => Err(Error::Queue(format!("task panicked: {}", e))),
                }
            }
        },
        Error::is_transient,
    )
    .await;

    match result {
        Ok(outcome) => {
            engine.metrics().record_task_completed();
            match outcome.skipped {
                Some(reason) => debug!("{} skipped: {}", name, reason),
                None => debug!(
                    "{} done: {} created, {} failed",
                    name,
                    outcome.created.len(),
                    outcome.failures.len()
                ),
            }
        }
        Err(e) => {
            engine.metrics().record_task_abandoned();
            error!("{} abandoned: {}", name, e);
        }
    }
}
