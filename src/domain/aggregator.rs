//! Bounded fan-out for per-security work.
//!
//! Items run on a dedicated pool of `max_concurrency` worker threads, so no
//! more than that many units are in flight at once. Results come back in input
//! order. If any unit fails the whole call fails with the first error a worker
//! observed and no partial results are returned.

use crate::domain::error::StratifyrError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

pub struct ConcurrentAggregator {
    pool: ThreadPool,
    max_concurrency: usize,
}

impl ConcurrentAggregator {
    pub fn new(max_concurrency: usize) -> Result<Self, StratifyrError> {
        if max_concurrency == 0 {
            return Err(StratifyrError::ConfigInvalid {
                section: "aggregator".into(),
                key: "max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_concurrency)
            .thread_name(|i| format!("stratifyr-agg-{i}"))
            .build()
            .map_err(|e| StratifyrError::ConfigInvalid {
                section: "aggregator".into(),
                key: "max_concurrency".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pool,
            max_concurrency,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs `unit` over every item and joins the results in input order.
    pub fn assemble_many<T, R, E, F>(&self, items: &[T], unit: F) -> Result<Vec<R>, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Sync + Send,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.pool.install(|| items.par_iter().map(&unit).collect())
    }
}

impl std::fmt::Debug for ConcurrentAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentAggregator")
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}
