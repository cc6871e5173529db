//! Crawl worker pool.
//!
//! Crawls block on remote calls, so they never run on the caller's thread.
//! Jobs go through a bounded queue to a fixed set of named threads; a full
//! queue is reported to the submitter instead of blocking it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::{MapperError, MapperResult};

use super::service::{RefreshReport, RefreshTarget, Shared};

const QUEUE: &str = "crawl";

pub(crate) enum Job {
    Refresh {
        target: RefreshTarget,
        reply: Sender<MapperResult<RefreshReport>>,
    },

    /// Occupies a worker until `release` fires or is dropped.
    #[cfg(test)]
    Block {
        started: Sender<()>,
        release: Receiver<()>,
    },
}

pub(crate) struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    pub(crate) fn start(workers: usize, queue_capacity: usize, shared: &Arc<Shared>) -> MapperResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            tx: Some(tx),
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let shared = Arc::clone(shared);
            let name = format!("mgmtbus-{QUEUE}-{idx}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || work(&rx, &shared))
                .map_err(|e| MapperError::Spawn {
                    worker: name,
                    reason: e.to_string(),
                })?;
            pool.workers.push(handle);
        }
        Ok(pool)
    }

    pub(crate) fn try_submit(&self, job: Job) -> MapperResult<()> {
        let Some(tx) = &self.tx else {
            return Err(MapperError::Disconnected { worker: QUEUE.to_string() });
        };
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(MapperError::QueueFull {
                queue: QUEUE.to_string(),
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(MapperError::Disconnected { worker: QUEUE.to_string() }),
        }
    }

    /// Closes the queue, lets workers drain it, and joins them.
    pub(crate) fn shutdown(&mut self) {
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work(rx: &Receiver<Job>, shared: &Shared) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Refresh { target, reply } => {
                let _ = reply.send(shared.refresh(&target));
            }

            #[cfg(test)]
            Job::Block { started, release } => {
                let _ = started.send(());
                let _ = release.recv();
            }
        }
    }
}

/// Handle for a queued refresh.
#[derive(Debug)]
pub struct RefreshHandle {
    rx: Receiver<MapperResult<RefreshReport>>,
}

impl RefreshHandle {
    pub(crate) const fn new(rx: Receiver<MapperResult<RefreshReport>>) -> Self {
        Self { rx }
    }

    /// Waits for the refresh to finish.
    pub fn join(self) -> MapperResult<RefreshReport> {
        self.rx
            .recv()
            .map_err(|_| MapperError::Disconnected { worker: QUEUE.to_string() })?
    }

    /// Waits at most `timeout` for the refresh to finish.
    pub fn join_timeout(self, timeout: Duration) -> MapperResult<RefreshReport> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => MapperError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => MapperError::Disconnected { worker: QUEUE.to_string() },
        })?
    }
}

/// Queues a job that holds its worker. Returns the started notification and
/// the release trigger.
#[cfg(test)]
pub(crate) fn submit_blocker(pool: &WorkerPool) -> MapperResult<(Receiver<()>, Sender<()>)> {
    let (started_tx, started_rx) = bounded::<()>(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    pool.try_submit(Job::Block {
        started: started_tx,
        release: release_rx,
    })?;
    Ok((started_rx, release_tx))
}
