//! Fixed-size worker pools with a bounded submission queue.
//!
//! A [`WorkerPool`] runs a [`WorkHandler`] on a fixed number of named
//! threads. Submitting blocks while the queue is full. The first handler
//! error trips the pool's [`StopSignal`]; queued items are then discarded
//! without being handled and the error is returned from
//! [`WorkerPool::shutdown`].
#![forbid(unsafe_code)]

mod pool;
mod signal;

pub use pool::{PoolError, PoolStats, WorkHandler, WorkerPool};
pub use signal::StopSignal;
