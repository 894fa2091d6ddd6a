use tracing::{debug, error};

use super::ThreadPool;
use crate::{KsError, Result};

/// A thread pool that uses a work stealing strategy as implemented by the [`Rayon`] library.
///
/// [`Rayon`]: https://docs.rs/rayon/latest/rayon/index.html
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|i| format!("kserver-worker-{}", i))
            // without a handler rayon aborts the process when a spawned job panics
            .panic_handler(|panic| error!("request handler panicked: {:?}", panic))
            .build()
            .map_err(|e| KsError::StringErr(format!("could not build thread pool: {:?}", &e)))?;
        debug!("created thread pool with {} threads", &threads);

        Ok(Self { pool })
    }

    // `spawn` rather than `install`, the accept loop must not wait for the request to finish
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
