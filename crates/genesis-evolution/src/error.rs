//! Error taxonomy of the growth loop.

use thiserror::Error;

/// Errors surfaced by the engine's direct API (`vote`, `apply`, `reject`, `rollback`)
/// and by analysis cycles.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvolutionError {
    /// vote/apply/reject on an id that was never registered.
    #[error("unknown proposal '{0}'")]
    UnknownProposal(String),

    /// Transition attempted from a terminal or wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// proposed_changes references a non-existent or type-incompatible profile path.
    #[error("invalid change at '{path}': {reason}")]
    InvalidChange { path: String, reason: String },

    /// Extractor or synthesizer failed during a cycle.
    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    /// The id generator produced an id that is already in use.
    #[error("id collision: '{0}' is already registered")]
    IdCollision(String),
}

impl EvolutionError {
    pub(crate) fn invalid_change(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidChange {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvolutionError>;
