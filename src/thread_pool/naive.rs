use std::thread;

use tracing::error;

use super::ThreadPool;
use crate::Result;

/// a simple thread-pool that is not actually a pool. It starts a new thread for every
/// request, which is how an embedded web server without a worker limit behaves
pub struct NaiveThreadPool;

impl ThreadPool for NaiveThreadPool {
    fn new(_threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = thread::Builder::new().name("kserver-request".into()).spawn(job) {
            error!("Failed to spawn a thread: {}", e);
        }
    }
}
