//! Long-lived worker pool with a soft shutdown barrier.

use crate::error::Result;
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct WorkerPool {
  pool: ThreadPool,
  workers: usize,
  outstanding: Arc<AtomicUsize>,
  accepting: Arc<AtomicBool>,
  epoch: Arc<AtomicU64>,
}

/// Decrements the outstanding counter when a task finishes, panics included.
struct Completion(Arc<AtomicUsize>);

impl Drop for Completion {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::AcqRel);
  }
}

impl WorkerPool {
  pub fn new(workers: usize) -> Result<WorkerPool> {
    let workers = workers.max(1);
    let pool = ThreadPoolBuilder::new()
      .num_threads(workers)
      .thread_name(|i| format!("safa-worker-{}", i))
      .build()?;

    Ok(WorkerPool {
      pool: pool,
      workers: workers,
      outstanding: Arc::new(AtomicUsize::new(0)),
      accepting: Arc::new(AtomicBool::new(true)),
      epoch: Arc::new(AtomicU64::new(0)),
    })
  }

  pub fn workers(&self) -> usize {
    return self.workers;
  }

  /// Runs a data-parallel batch on the pool's threads and waits for it.
  pub fn install<OP, R>(&self, op: OP) -> R
  where
    OP: FnOnce() -> R + Send,
    R: Send,
  {
    return self.pool.install(op);
  }

  /// Spawns a detached task. Returns false if the pool is shutting down.
  ///
  /// A task that only starts after the next [`restart`](Self::restart) is
  /// dropped without running.
  pub fn submit<F>(&self, task: F) -> bool
  where
    F: FnOnce() + Send + 'static,
  {
    if !self.accepting.load(Ordering::Acquire) {
      return false;
    }

    let submitted_in = self.epoch.load(Ordering::Acquire);
    let epoch = Arc::clone(&self.epoch);
    self.outstanding.fetch_add(1, Ordering::AcqRel);
    let completion = Completion(Arc::clone(&self.outstanding));

    self.pool.spawn(move || {
      let _completion = completion;
      let current = epoch.load(Ordering::Acquire);
      if current != submitted_in {
        debug!("Discarding task from epoch {} (now {})", submitted_in, current);
        return;
      }
      task();
    });
    return true;
  }

  /// Detached tasks submitted but not yet finished.
  pub fn outstanding(&self) -> usize {
    return self.outstanding.load(Ordering::Acquire);
  }

  pub fn has_capacity(&self) -> bool {
    return self.outstanding() < self.workers;
  }

  pub fn epoch(&self) -> u64 {
    return self.epoch.load(Ordering::Acquire);
  }

  /// Stops accepting tasks and polls every `interval` until all outstanding
  /// tasks have finished. Tasks are never interrupted.
  pub fn shutdown(&self, interval: Duration) {
    self.accepting.store(false, Ordering::Release);

    loop {
      let outstanding = self.outstanding();
      if outstanding == 0 {
        break;
      }
      debug!("Waiting for {} workers to finish", outstanding);
      thread::sleep(interval);
    }
  }

  /// Starts a new epoch and accepts tasks again.
  pub fn restart(&self) -> u64 {
    let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
    self.accepting.store(true, Ordering::Release);
    return epoch;
  }
}
