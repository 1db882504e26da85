use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use citylink_core::{ConfigError, PoolConfig};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::StopSignal;

/// Processes one work item at a time on a pool thread.
pub trait WorkHandler<T>: Send + Sync + 'static {
    /// Error that stops the pool.
    type Error: std::error::Error + Send + 'static;

    /// Handle `item`.
    ///
    /// # Errors
    /// Any error stops the pool and is reported by [`WorkerPool::shutdown`].
    fn handle(&self, item: T) -> Result<(), Self::Error>;
}

/// Errors raised by [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError<E>
where
    E: std::error::Error + 'static,
{
    /// The pool configuration was rejected.
    #[error("invalid worker pool configuration: {0}")]
    Config(#[from] ConfigError),
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread {name}: {source}")]
    Spawn {
        /// Name of the thread.
        name: String,
        /// Error reported by the operating system.
        #[source]
        source: std::io::Error,
    },
    /// The handler failed; the pool stopped taking work.
    #[error("work item failed: {0}")]
    Handler(#[source] E),
    /// A worker thread panicked.
    #[error("worker thread {name} panicked")]
    WorkerPanicked {
        /// Name of the thread.
        name: String,
    },
    /// The pool was stopped before the item could be queued.
    #[error("worker pool is stopped")]
    Stopped,
}

/// Item counts reported when a pool shuts down cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Items passed to the handler.
    pub handled: usize,
    /// Items dropped because the pool had been stopped.
    pub discarded: usize,
}

#[derive(Debug, Default)]
struct Counters {
    handled: AtomicUsize,
    discarded: AtomicUsize,
}

/// Fixed number of threads draining a bounded queue into a handler.
pub struct WorkerPool<T, H>
where
    H: WorkHandler<T>,
{
    name: String,
    sender: Option<Sender<T>>,
    workers: Vec<(String, JoinHandle<()>)>,
    stop: StopSignal,
    first_error: Arc<Mutex<Option<H::Error>>>,
    counters: Arc<Counters>,
}

impl<T, H> fmt::Debug for WorkerPool<T, H>
where
    H: WorkHandler<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("workers", &self.workers.len())
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

impl<T, H> WorkerPool<T, H>
where
    T: Send + 'static,
    H: WorkHandler<T>,
{
    /// Start `config.workers` threads named `{name}-{n}`.
    ///
    /// # Errors
    /// Returns [`PoolError::Config`] for an invalid configuration and
    /// [`PoolError::Spawn`] when a thread cannot be started; threads already
    /// started are stopped and joined first.
    pub fn start(
        name: &str,
        config: PoolConfig,
        handler: &Arc<H>,
        stop: StopSignal,
    ) -> Result<Self, PoolError<H::Error>> {
        config.validate()?;
        let (sender, receiver) = bounded(config.queue_size);
        let mut pool = Self {
            name: name.to_owned(),
            sender: Some(sender),
            workers: Vec::with_capacity(config.workers),
            stop,
            first_error: Arc::new(Mutex::new(None)),
            counters: Arc::new(Counters::default()),
        };
        for index in 0..config.workers {
            let thread_name = format!("{name}-{index}");
            match pool.spawn_worker(&thread_name, receiver.clone(), Arc::clone(handler)) {
                Ok(handle) => pool.workers.push((thread_name, handle)),
                Err(source) => {
                    pool.stop.stop();
                    if let Err(err) = pool.shutdown() {
                        warn!("worker pool {name} failed while aborting start: {err}");
                    }
                    return Err(PoolError::Spawn {
                        name: thread_name,
                        source,
                    });
                }
            }
        }
        debug!("started {} with {} workers", pool.name, config.workers);
        Ok(pool)
    }

    fn spawn_worker(
        &self,
        thread_name: &str,
        receiver: Receiver<T>,
        handler: Arc<H>,
    ) -> std::io::Result<JoinHandle<()>> {
        let stop = self.stop.clone();
        let first_error = Arc::clone(&self.first_error);
        let counters = Arc::clone(&self.counters);
        thread::Builder::new()
            .name(thread_name.to_owned())
            .spawn(move || {
                for item in &receiver {
                    if stop.is_stopped() {
                        counters.discarded.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    counters.handled.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = handler.handle(item) {
                        stop.stop();
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            warn!("work item failed, stopping pool: {err}");
                            *slot = Some(err);
                        }
                    }
                }
            })
    }

    /// Queue `item`, blocking while the queue is full.
    ///
    /// # Errors
    /// Returns [`PoolError::Stopped`] once the stop signal is set.
    pub fn submit(&self, item: T) -> Result<(), PoolError<H::Error>> {
        if self.stop.is_stopped() {
            return Err(PoolError::Stopped);
        }
        let sender = self.sender.as_ref().ok_or(PoolError::Stopped)?;
        sender.send(item).map_err(|_| PoolError::Stopped)
    }

    /// The stop signal observed by this pool's workers.
    #[must_use]
    pub const fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Close the queue, wait for every worker and report the outcome.
    ///
    /// Items still queued are handled unless the pool has been stopped.
    ///
    /// # Errors
    /// Returns the first handler error as [`PoolError::Handler`], or
    /// [`PoolError::WorkerPanicked`] when a worker panicked.
    pub fn shutdown(mut self) -> Result<PoolStats, PoolError<H::Error>> {
        drop(self.sender.take());
        let mut panicked = None;
        for (thread_name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked.get_or_insert(thread_name);
            }
        }
        if let Some(err) = self.first_error.lock().take() {
            return Err(PoolError::Handler(err));
        }
        if let Some(name) = panicked {
            return Err(PoolError::WorkerPanicked { name });
        }
        let stats = PoolStats {
            handled: self.counters.handled.load(Ordering::SeqCst),
            discarded: self.counters.discarded.load(Ordering::SeqCst),
        };
        debug!(
            "{} finished: {} handled, {} discarded",
            self.name, stats.handled, stats.discarded
        );
        Ok(stats)
    }
}

impl<T, H> Drop for WorkerPool<T, H>
where
    H: WorkHandler<T>,
{
    fn drop(&mut self) {
        drop(self.sender.take());
        for (thread_name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("worker thread {thread_name} panicked");
            }
        }
    }
}
