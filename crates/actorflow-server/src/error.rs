//! Server error types.

use std::net::SocketAddr;

use actorflow::PipelineError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while setting up or driving the event loop.
///
/// Transport failures on individual sessions never show up here: they close
/// the session and are logged.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error from the poll, a waker or a registration.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Pipeline wiring error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// The reactor a handle points to has been dropped.
    #[error("reactor is gone")]
    ReactorGone,

    /// The reactor was asked to shut down.
    #[error("server shutdown")]
    Shutdown,
}
