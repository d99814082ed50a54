//! Bounded worker pool for datagram dispatch
//!
//! The transport loop must never block on a slow authority, so each
//! datagram is queued to a fixed set of worker threads. When the queue is
//! full the job is refused and the caller decides what to drop.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Queue at capacity
    Full,
    /// All workers have exited
    Closed,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full => write!(f, "dispatch queue full"),
            SubmitError::Closed => write!(f, "dispatch pool closed"),
        }
    }
}

impl std::error::Error for SubmitError {}

pub struct WorkerPool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing a queue of `capacity` pending jobs
    pub fn new(size: usize, capacity: usize) -> io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("coap-worker-{}", i))
                .spawn(move || worker_loop(receiver))?;
            workers.push(handle);
        }

        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job without blocking
    pub fn try_execute<F>(&self, job: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(SubmitError::Closed)?;
        sender.try_send(Box::new(job)).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Disconnected(_) => SubmitError::Closed,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    /// Close the queue, let workers drain what is already queued, then join
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("coap-worker").to_string();
            if handle.join().is_err() {
                log::warn!("Worker {} exited abnormally", name);
            }
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // Hold the lock only while waiting for the next job
        let job = {
            let rx = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            rx.recv()
        };

        match job {
            Ok(job) => {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    log::error!("Dispatch job panicked");
                }
            }
            // Sender dropped and queue drained
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_before_drop_returns() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(4, 64).unwrap();
            assert_eq!(pool.size(), 4);
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                pool.try_execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_full_queue_rejects() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let gate = Arc::new(Barrier::new(2));

        // Occupy the only worker
        let worker_gate = Arc::clone(&gate);
        pool.try_execute(move || {
            worker_gate.wait();
        })
        .unwrap();

        // Wait until the worker has taken the job off the queue
        let mut queued = false;
        for _ in 0..100 {
            if pool.try_execute(|| {}).is_ok() {
                queued = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(queued);

        assert_eq!(pool.try_execute(|| {}), Err(SubmitError::Full));
        gate.wait();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(1, 8).unwrap();
            pool.try_execute(|| panic!("boom")).unwrap();
            let c = Arc::clone(&counter);
            pool.try_execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
