use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that travel between actors as `"error"` replies.
///
/// The enum is serialized into the reply envelope, so a caller on the far side
/// of a channel gets back the same variant the handler produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CommandError {
    /// Malformed or out-of-range input. Never retried.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// A value that could not be interpreted at all, e.g. a non-integer brightness.
    #[error("{0}")]
    BadRequest(String),
    #[error("Command {0} does not exist")]
    UnknownCommand(String),
    #[error("no reply to '{command}' within {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },
    #[error("channel to {0} is disconnected")]
    Disconnected(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}
