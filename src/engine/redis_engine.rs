use std::time::Duration;

use redis::{Client, Value};
use tracing::{debug, error, instrument};

use super::StoreEngine;
use crate::{KsError, Result};

/// connect, read and write timeout for every store round trip
pub const STORE_TIMEOUT: Duration = Duration::from_millis(1500);

/// A [`StoreEngine`] backed by a redis server.
///
/// No connection is held between commands: every call to [`execute`](StoreEngine::execute)
/// opens a fresh connection, sends one command, and closes the connection again whether
/// the command succeeded or not.
#[derive(Clone, Debug)]
pub struct RedisEngine {
    client: Client,
    timeout: Duration,
}

impl RedisEngine {
    /// creates an engine that will connect to the redis server at `host`:`port`.
    /// No connection is attempted until the first command is executed.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::open(format!("redis://{}:{}/", host, port))
            .map_err(|e| KsError::Parsing(format!("invalid redis address {}:{}: {}", host, port, e)))?;
        Ok(RedisEngine { client, timeout: STORE_TIMEOUT })
    }

    /// replaces the default connect/read/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl StoreEngine for RedisEngine {
    #[instrument(skip(self), level = "debug")]
    fn execute(&self, args: &[String]) -> Result<Value> {
        let (name, rest) = args
            .split_first()
            .ok_or_else(|| KsError::Format("empty command".to_string()))?;

        let mut conn = self.client.get_connection_with_timeout(self.timeout).map_err(|e| {
            error!("redis connection error: {}", e);
            KsError::Unavailable(e.to_string())
        })?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;

        let mut cmd = redis::cmd(name);
        for arg in rest {
            cmd.arg(arg);
        }
        let reply: Value = cmd.query(&mut conn)?;
        debug!(?reply);
        // conn is dropped, and the socket closed, on every path out of here
        Ok(reply)
    }
}
