//! Bounded worker pool
//!
//! An explicit FIFO job queue consumed by a fixed set of worker tasks, so
//! backpressure is absorbed by queueing rather than by dropping work.
//! Shutdown closes the queue, drains with a bounded wait, and aborts
//! stragglers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A fixed set of workers pulling jobs off a shared FIFO queue
pub struct WorkerPool {
    queue: mpsc::UnboundedSender<Job>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Start a pool with the given number of workers
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut set = JoinSet::new();
        for _ in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            set.spawn(async move {
                loop {
                    // The receiver lock is held only while idle-waiting,
                    // never while a job runs
                    let job = { receiver.lock().await.recv().await };
                    let Some(job) = job else { break };
                    job.await;
                }
            });
        }

        Self {
            queue,
            workers: set,
        }
    }

    /// Submit a job without waiting for it to run
    ///
    /// Jobs start in submission order as workers free up.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.queue.send(Box::pin(job)).is_err() {
            tracing::warn!("worker pool is shut down, job dropped");
        }
    }

    /// Close the queue and wait for the workers, bounded by `timeout`
    ///
    /// Already-queued jobs still run (they abort at their entry checkpoint
    /// once shutdown is signalled). Workers still busy at the deadline are
    /// aborted.
    pub async fn drain(mut self, timeout: Duration) {
        drop(self.queue);

        let drained = tokio::time::timeout(timeout, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "worker pool drain timed out, aborting stragglers"
            );
            self.workers.abort_all();
        }
    }
}
