//! This module provides the store engines the gateway can send commands to.
//! The two engines that are implemented are [`RedisEngine`], which talks to a real redis server,
//! and [`MemoryEngine`], an in-process stand-in that understands the handful of hash commands
//! the gateway issues. The memory engine is useful for local development and for tests.
use crate::Result;

/// A trait for sending a single command to a key/value store
pub trait StoreEngine: Clone + Send + 'static {
    /// sends the command made up of `args` (command name first) and returns the raw reply.
    ///
    /// # Errors
    ///
    /// Returns `KsError::Unavailable` if the store could not be reached or stopped answering,
    /// and `KsError::Command` if the store answered with an error reply.
    fn execute(&self, args: &[String]) -> Result<redis::Value>;
}

mod memory;
mod redis_engine;

pub use self::memory::MemoryEngine;
pub use self::redis_engine::RedisEngine;
