use thiserror::Error;

/// type alias for all operations in the gateway that could fail with a [`KsError`]
pub type Result<T> = std::result::Result<T, KsError>;

/// The Error variants used throughout kserver.
/// It wraps lower level errors from third party crates, as well as the gateway's own
/// failure cases
#[derive(Error, Debug)]
pub enum KsError {
    /// variant for errors caused from IO
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// serde_json Error
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// a request body was well formed JSON but a required field was missing, empty or
    /// had the wrong type
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// a store command could not be built from its template
    #[error("could not format command: {0}")]
    Format(String),

    /// the store could not be reached, or it stopped answering mid-command
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// the store answered with an error reply
    #[error("store command failed: {0}")]
    Command(String),

    /// a directive in the configuration file was rejected
    #[error("line {line}: '{text}': {msg}")]
    Config {
        /// one based line number within the file
        line: usize,
        /// the offending line, trimmed
        text: String,
        /// why it was rejected
        msg: String,
    },

    /// error parsing a command line value
    #[error("{0}")]
    Parsing(String),

    /// generic error with a string message
    #[error("{0}")]
    StringErr(String),
}

impl From<redis::RedisError> for KsError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() || e.is_connection_refusal() || e.is_connection_dropped() {
            KsError::Unavailable(e.to_string())
        } else {
            KsError::Command(e.to_string())
        }
    }
}
