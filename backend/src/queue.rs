//! Job queue and worker pool.
//!
//! [`JobQueue::enqueue`] is the decoupling point between the request path and
//! generation: it returns as soon as the job is on the channel, before any
//! worker has picked it up. The pool runs N independent tasks, so jobs —
//! including two jobs for the same conversation — execute in parallel with
//! no ordering guarantee between their completions.

use crate::worker::{self, WorkerContext};
use shared::models::GenerationJob;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub const DEFAULT_WORKER_COUNT: usize = 4;

pub trait JobQueue: Send + Sync {
    /// Accept a job for asynchronous execution. Never blocks on generation.
    fn enqueue(&self, job: GenerationJob);
}

/// Worker pool consuming jobs from an unbounded in-process channel.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<GenerationJob>,
}

impl WorkerPool {
    /// Spawn `workers` consumer tasks sharing one receiver.
    pub fn start(ctx: Arc<WorkerContext>, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<GenerationJob>();
        let rx = Arc::new(Mutex::new(rx));

        for n in 0..workers {
            let rx = Arc::clone(&rx);
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                loop {
                    // Hold the lock only while waiting for the next job so
                    // siblings keep draining the queue in parallel.
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    tracing::debug!(
                        worker = n,
                        conversation_id = %job.conversation_id,
                        "generation job picked up"
                    );
                    worker::run_job(&ctx, job).await;
                }
                tracing::debug!(worker = n, "queue closed, worker stopping");
            });
        }

        Self { tx }
    }
}

impl JobQueue for WorkerPool {
    fn enqueue(&self, job: GenerationJob) {
        if self.tx.send(job).is_err() {
            tracing::error!("job queue closed, dropping generation job");
        }
    }
}
