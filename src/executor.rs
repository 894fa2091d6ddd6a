use tracing::{debug, error, warn};

use crate::command::{self, Arg, Operation};
use crate::decode::Outcome;
use crate::engine::StoreEngine;
use crate::{KsError, Result};

/// Runs command table [`Operation`]s against a [`StoreEngine`].
///
/// For each call the executor looks the operation up in the command table, formats its
/// template with the given arguments, sends the command through the engine and decodes
/// the reply.
#[derive(Clone, Debug)]
pub struct Executor<E: StoreEngine> {
    engine: E,
    page_size: u64,
}

impl<E: StoreEngine> Executor<E> {
    /// creates an executor that sends its commands through `engine`, scanning `page_size`
    /// entries per page
    pub fn new(engine: E, page_size: u64) -> Self {
        Executor { engine, page_size }
    }

    /// the `COUNT` hint passed to every scan
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Runs `op` with the positional `args` and returns the decoded outcome.
    ///
    /// An error reply from the store is decoded as [`Outcome::Failure`].
    ///
    /// # Errors
    /// - [`KsError::Format`] if `args` do not fit the operation's template
    /// - [`KsError::Unavailable`] if the store could not be reached
    pub fn run(&self, op: Operation, args: &[Arg]) -> Result<Outcome> {
        let action = op.action();
        let cmd = command::format(action.template, args)?;
        debug!(?op, ?cmd, "sending command");

        match self.engine.execute(&cmd) {
            Ok(reply) => {
                let outcome = (action.decoder)(reply);
                if outcome == Outcome::Failure {
                    warn!(?op, "store reply decoded as a failure");
                }
                Ok(outcome)
            }
            Err(KsError::Command(msg)) => {
                warn!(?op, "store rejected command: {}", msg);
                Ok(Outcome::Failure)
            }
            Err(e) => {
                error!(?op, "command could not be sent: {}", e);
                Err(e)
            }
        }
    }
}
