//! Resolution on a dedicated worker pool.
#![forbid(unsafe_code)]

use std::sync::Arc;

use citylink_core::{DeferredReference, PoolConfig};
use citylink_worker::{PoolError, WorkHandler, WorkerPool};

use crate::{CrossReferenceResolver, ResolutionReport, ResolveError, RunContext};

#[derive(Debug)]
struct ResolveHandler {
    resolver: Arc<CrossReferenceResolver>,
}

impl WorkHandler<DeferredReference> for ResolveHandler {
    type Error = ResolveError;

    fn handle(&self, item: DeferredReference) -> Result<(), ResolveError> {
        self.resolver.resolve(&item).map(|_| ())
    }
}

/// A [`CrossReferenceResolver`] fed by its own worker pool.
///
/// The pool observes the run's stop signal, so a failure elsewhere in the
/// run stops resolution too.
#[derive(Debug)]
pub struct ResolverPool {
    pool: WorkerPool<DeferredReference, ResolveHandler>,
    resolver: Arc<CrossReferenceResolver>,
}

impl ResolverPool {
    /// Create the resolver and start `config.workers` resolution threads.
    ///
    /// # Errors
    /// Returns [`PoolError::Handler`] when the resolver cannot be created and
    /// the pool's own errors when the threads cannot start.
    pub fn start(context: RunContext, config: PoolConfig) -> Result<Self, PoolError<ResolveError>> {
        let stop = context.stop_signal().clone();
        let resolver = Arc::new(CrossReferenceResolver::new(context).map_err(PoolError::Handler)?);
        let handler = Arc::new(ResolveHandler {
            resolver: Arc::clone(&resolver),
        });
        let pool = WorkerPool::start("citylink-resolver", config, &handler, stop)?;
        Ok(Self { pool, resolver })
    }

    /// Queue a work item, blocking while the queue is full.
    ///
    /// # Errors
    /// Returns [`PoolError::Stopped`] once the run has been stopped.
    pub fn submit(&self, item: DeferredReference) -> Result<(), PoolError<ResolveError>> {
        self.pool.submit(item)
    }

    /// The resolver behind the pool.
    #[must_use]
    pub fn resolver(&self) -> &CrossReferenceResolver {
        &self.resolver
    }

    /// Wait for queued items, then close the resolver.
    ///
    /// The resolver is closed even when the pool failed, so patches that were
    /// already batched still reach the database.
    ///
    /// # Errors
    /// Returns the first handler or pool error, otherwise the resolver's close
    /// failure.
    pub fn finish(self) -> Result<ResolutionReport, PoolError<ResolveError>> {
        let pooled = self.pool.shutdown();
        let closed = self.resolver.close();
        match (pooled, closed) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(PoolError::Handler(err)),
            (Ok(_), Ok(report)) => Ok(report),
        }
    }
}
