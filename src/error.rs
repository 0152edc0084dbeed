//! Error types for ca821x-link.

use thiserror::Error;

use crate::protocol::CommandId;

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error from the byte source or byte sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport endpoint went away.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The byte sink cannot take more data right now.
    #[error("Transport would block")]
    WouldBlock,

    /// A wait did not see its expected command before the deadline.
    #[error("Timed out after {timeout_ms}ms waiting for {command}")]
    Timeout {
        /// Command the wait was expecting.
        command: CommandId,
        /// Timeout that expired.
        timeout_ms: u32,
    },

    /// A synchronous wait is already outstanding on this dispatcher.
    #[error("A synchronous wait is already outstanding")]
    Busy,

    /// Tasklet already scheduled, or cancelled while not scheduled.
    #[error("Already in the requested state")]
    Already,

    /// Invalid arguments (delay beyond horizon, oversized payload, bad config).
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// Operation not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Nothing found (no tasklet due, empty queue).
    #[error("Not found")]
    NotFound,

    /// All tasklet slots are in use.
    #[error("No free tasklet slots")]
    NoCapacity,

    /// A registered handler reported a failure.
    #[error("Handler for {command} failed: {message}")]
    Handler {
        /// Command the handler was invoked for.
        command: CommandId,
        /// Handler supplied description.
        message: String,
    },

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
