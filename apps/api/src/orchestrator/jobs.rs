use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::orchestrator::service::Orchestrator;

/// Background work an assessment can be waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analyze,
    Evaluate,
}

/// One unit of stage work. `token` is the processing token observed when the
/// stage was entered; a worker holding a stale token does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageJob {
    pub assessment_id: Uuid,
    pub token: Uuid,
    pub stage: Stage,
}

#[derive(Debug, Error)]
#[error("Stage queue is closed")]
pub struct QueueClosed;

/// Producer side of the bounded stage queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<StageJob>,
}

/// Consumer side, shared by every worker.
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<StageJob>>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self { tx },
            JobReceiver {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Waits for room when the queue is full.
    pub async fn enqueue(&self, job: StageJob) -> Result<(), QueueClosed> {
        self.tx.send(job).await.map_err(|_| QueueClosed)
    }
}

impl JobReceiver {
    /// Next job, or `None` once every producer is gone.
    pub async fn recv(&self) -> Option<StageJob> {
        self.rx.lock().await.recv().await
    }
}

/// Starts `count` workers pulling from `receiver`.
pub fn spawn_workers(
    orchestrator: Arc<Orchestrator>,
    receiver: JobReceiver,
    count: usize,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|worker| {
            let orchestrator = Arc::clone(&orchestrator);
            let receiver = receiver.clone();
            tokio::spawn(async move {
                debug!("Stage worker {worker} started");
                while let Some(job) = receiver.recv().await {
                    orchestrator.run_stage(job).await;
                }
                info!("Stage worker {worker} stopped: queue closed");
            })
        })
        .collect()
}
