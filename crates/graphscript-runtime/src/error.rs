//! Error types for the runtime control layer.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using RuntimeControlError
pub type Result<T> = std::result::Result<T, RuntimeControlError>;

/// Errors that can occur while starting or talking to a runtime process.
#[derive(Debug, Error)]
pub enum RuntimeControlError {
    /// The runtime process could not be started
    #[error("failed to start runtime process: {0}")]
    Spawn(String),

    /// The runtime never announced its control port
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The handshake line did not carry a valid port
    #[error("malformed handshake line: {0}")]
    MalformedHandshake(String),

    /// The control channel failed or closed unexpectedly
    #[error("control channel error: {0}")]
    Channel(String),

    /// The runtime does not expose the requested service
    #[error("service '{0}' not found on runtime")]
    ServiceNotFound(String),

    /// A remote command or transfer session failed
    #[error("remote session error: {0}")]
    Session(String),

    /// A file transfer was cancelled by the user
    #[error("file transfer cancelled")]
    TransferCancelled,

    /// Compilation failed before anything was started
    #[error("compile error: {0}")]
    Compile(#[from] graphscript_compiler::CompileError),

    /// Control frame (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
