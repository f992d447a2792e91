//! Named pool of OS threads with a cooperative stop signal.
//!
//! Every thread group of the engine is a `WorkerPool` running a different
//! body: the Flushers workers, the page-flusher orchestrator and the fault
//! servicer. Components hold a pool; none of them is one.

use core::time::Duration;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::domain::PoolError;

/// Longest a worker may go without checking its [`StopToken`].
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
struct StopSignal {
    requested: Mutex<bool>,
    cond: Condvar,
}

/// A worker's view of its pool's stop flag.
#[derive(Debug, Clone)]
pub struct StopToken {
    signal: Arc<StopSignal>,
}

impl StopToken {
    /// Check whether the pool asked its workers to exit.
    pub fn should_stop(&self) -> bool {
        *self.signal.requested.lock()
    }

    /// Sleep for up to `timeout`, returning early when a stop is requested.
    ///
    /// Returns `true` if the pool is stopping.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut requested = self.signal.requested.lock();
        if !*requested {
            self.signal.cond.wait_for(&mut requested, timeout);
        }
        *requested
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Joined,
}

/// A named group of worker threads.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use core::time::Duration;
/// use lazymap::infrastructure::WorkerPool;
///
/// let ticks = Arc::new(AtomicUsize::new(0));
/// let mut pool = WorkerPool::new("ticker");
/// let counter = Arc::clone(&ticks);
/// pool.start(2, move |_, stop| {
///     while !stop.wait_timeout(Duration::from_millis(5)) {
///         counter.fetch_add(1, Ordering::Relaxed);
///     }
/// })
/// .unwrap();
///
/// pool.request_stop();
/// pool.join().unwrap();
/// ```
pub struct WorkerPool {
    name: String,
    signal: Arc<StopSignal>,
    handles: Vec<JoinHandle<()>>,
    lifecycle: Lifecycle,
}

impl WorkerPool {
    /// Create an idle pool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signal: Arc::new(StopSignal::default()),
            handles: Vec::new(),
            lifecycle: Lifecycle::Idle,
        }
    }

    /// Name of the pool, also used to name its threads.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live worker threads.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check whether the pool has no threads.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// A token observing this pool's stop flag.
    pub fn stop_token(&self) -> StopToken {
        StopToken {
            signal: Arc::clone(&self.signal),
        }
    }

    /// Spawn `workers` threads, each running `body(index, stop_token)`.
    ///
    /// A body must return once its token reports a stop, checking at least
    /// every [`STOP_POLL_INTERVAL`].
    ///
    /// # Errors
    ///
    /// - [`PoolError::AlreadyStarted`] if the pool was started before
    /// - [`PoolError::Spawn`] if a thread could not be created; threads
    ///   spawned so far are stopped and joined
    pub fn start<F>(&mut self, workers: usize, body: F) -> Result<(), PoolError>
    where
        F: Fn(usize, StopToken) + Send + Sync + 'static,
    {
        if self.lifecycle != Lifecycle::Idle {
            return Err(PoolError::AlreadyStarted(self.name.clone()));
        }
        self.lifecycle = Lifecycle::Running;

        let body = Arc::new(body);
        for index in 0..workers {
            let body = Arc::clone(&body);
            let token = self.stop_token();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || body(index, token));
            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    self.request_stop();
                    self.join_all();
                    return Err(PoolError::Spawn(e));
                }
            }
        }
        log::info!("Started worker pool '{}' with {} threads", self.name, workers);
        Ok(())
    }

    /// Ask every worker to exit. Idempotent, and does not interrupt work in
    /// progress.
    pub fn request_stop(&self) {
        let mut requested = self.signal.requested.lock();
        if !*requested {
            *requested = true;
            log::debug!("Stop requested for worker pool '{}'", self.name);
        }
        self.signal.cond.notify_all();
    }

    /// Block until every worker thread has exited.
    ///
    /// Joining an already joined pool returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NotStarted`] if the pool was never started.
    pub fn join(&mut self) -> Result<(), PoolError> {
        match self.lifecycle {
            Lifecycle::Idle => Err(PoolError::NotStarted(self.name.clone())),
            Lifecycle::Joined => Ok(()),
            Lifecycle::Running => {
                self.join_all();
                log::info!("Worker pool '{}' stopped", self.name);
                Ok(())
            }
        }
    }

    fn join_all(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("A thread of worker pool '{}' panicked", self.name);
            }
        }
        self.lifecycle = Lifecycle::Joined;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            self.request_stop();
            self.join_all();
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.handles.len())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
