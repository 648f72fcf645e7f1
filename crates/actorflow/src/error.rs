//! Pipeline error types.

use thiserror::Error;

/// Result type for pipeline wiring.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while wiring a pipeline.
///
/// Processing failures are not errors at this level: they travel through the
/// pipeline as ordinary `Result` messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// An emitter was given a second downstream handler.
    #[error("{stage} already has a message handler")]
    HandlerAlreadyRegistered {
        /// Name of the stage that rejected the handler.
        stage: &'static str,
    },

    /// A source could not start producing when its handler was registered.
    #[error("{stage} could not start: {reason}")]
    SourceUnavailable {
        /// Name of the source.
        stage: &'static str,
        /// What went wrong, usually an I/O error message.
        reason: String,
    },
}

impl PipelineError {
    /// Creates a [`PipelineError::HandlerAlreadyRegistered`] for `stage`.
    pub fn already_registered(stage: &'static str) -> Self {
        Self::HandlerAlreadyRegistered { stage }
    }

    /// Creates a [`PipelineError::SourceUnavailable`] for an external source.
    pub fn source_unavailable(stage: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            stage,
            reason: reason.to_string(),
        }
    }
}
