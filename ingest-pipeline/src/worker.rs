//! Fixed-size worker pool consuming ingestion tasks.
//!
//! Each worker loops dequeue → process under the configured deadlines: the
//! soft ceiling converts into the retryable failure path (the job is never
//! left `Processing`), the hard ceiling abandons the task outright and
//! leaves the stuck row to the external cleanup sweep.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::pipeline::IngestionPipeline;
use crate::queue::IngestTask;

/// Fixed-size pool of ingestion workers.
pub struct WorkerPool {
    pipeline: Arc<IngestionPipeline>,
    cfg: IngestConfig,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<IngestionPipeline>, cfg: IngestConfig) -> Self {
        Self { pipeline, cfg }
    }

    /// Runs `workers` consumers over the shared receiver until the queue
    /// closes, then drains and returns.
    pub async fn run(self, receiver: mpsc::Receiver<IngestTask>, workers: usize) {
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = workers.max(1);
        info!("starting {workers} ingestion workers");

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let receiver = receiver.clone();
            let pipeline = self.pipeline.clone();
            let cfg = self.cfg.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let task = { receiver.lock().await.recv().await };
                    let Some(task) = task else {
                        break; // queue closed
                    };
                    Self::run_one(&pipeline, &cfg, task, worker_id).await;
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        info!("ingestion workers stopped");
    }

    async fn run_one(
        pipeline: &IngestionPipeline,
        cfg: &IngestConfig,
        task: IngestTask,
        worker_id: usize,
    ) {
        let job_id = task.job_id.clone();
        let attempt = async {
            match timeout(cfg.soft_timeout, pipeline.process(&task.job_id, &task.url)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Store/queue failures: the job row may be stale, but the
                    // at-least-once queue will re-deliver.
                    error!("worker {worker_id}: job {} errored: {e}", task.job_id);
                }
                Err(_) => {
                    warn!(
                        "worker {worker_id}: job {} hit the soft deadline",
                        task.job_id
                    );
                    if let Err(e) = pipeline.handle_timeout(&task.job_id).await {
                        error!(
                            "worker {worker_id}: timeout cleanup for job {} failed: {e}",
                            task.job_id
                        );
                    }
                }
            }
        };

        if timeout(cfg.hard_timeout, attempt).await.is_err() {
            error!(
                "worker {worker_id}: job {job_id} exceeded the hard deadline; \
                 leaving it to the cleanup sweep"
            );
        }
    }
}
