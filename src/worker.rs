use std::thread;

use crossbeam_channel::{Sender, bounded};

use crate::error::{Result, ServiceError};

const QUEUE_DEPTH: usize = 16;

struct Job<I, O> {
    input: I,
    reply_tx: Sender<Result<O>>,
}

/// Owns a collaborator on a dedicated thread and runs one job at a time.
/// Model sessions need exclusive access, so concurrent requests queue here
/// instead of locking inside the pipeline.
pub struct Worker<I, O> {
    name: String,
    job_tx: Option<Sender<Job<I, O>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<I: Send + 'static, O: Send + 'static> Worker<I, O> {
    pub fn spawn<F>(name: impl Into<String>, mut handler: F) -> anyhow::Result<Self>
    where
        F: FnMut(I) -> Result<O> + Send + 'static,
    {
        let name = name.into();
        let (job_tx, job_rx) = bounded::<Job<I, O>>(QUEUE_DEPTH);

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            log::debug!("worker {thread_name} started");
            while let Ok(job) = job_rx.recv() {
                let result = handler(job.input);
                let _ = job.reply_tx.send(result);
            }
            log::debug!("worker {thread_name} stopped");
        })?;

        Ok(Self {
            name,
            job_tx: Some(job_tx),
            handle: Some(handle),
        })
    }

    /// Blocks until the worker has handled `input`.
    pub fn call(&self, input: I) -> Result<O> {
        let (reply_tx, reply_rx) = bounded(1);
        let job_tx = self.job_tx.as_ref().ok_or_else(|| self.gone())?;
        job_tx
            .send(Job { input, reply_tx })
            .map_err(|_| self.gone())?;
        reply_rx.recv().map_err(|_| self.gone())?
    }

    fn gone(&self) -> ServiceError {
        log::error!("worker {} is no longer running", self.name);
        ServiceError::Inference(format!("worker {} is no longer running", self.name))
    }
}

impl<I, O> Drop for Worker<I, O> {
    fn drop(&mut self) {
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
