//! Player error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the story player.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// A narrative element has no representation collection reference.
    #[error("narrative element {0} has no representation collection")]
    MissingRepresentationCollection(Uuid),

    /// A narrative element could not be found in the story graph.
    #[error("narrative element not found: {0}")]
    NarrativeElementNotFound(Uuid),

    /// A fetcher or the representation reasoner rejected.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A representation type string that no renderer handles.
    #[error("unknown representation type: {0}")]
    UnknownRepresentationType(String),

    /// A behaviour type string that no handler is registered for.
    #[error("unknown behaviour type: {0}")]
    UnknownBehaviourType(String),

    /// A behaviour failed while running or clearing.
    #[error("behaviour error: {0}")]
    Behaviour(String),

    /// An operation was invoked in a lifecycle phase that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PlayerError {
    /// Returns `true` for resolution failures (fetch/reasoner/missing data),
    /// which abort a transition and leave the previous renderer active.
    #[must_use]
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRepresentationCollection(_)
                | Self::NarrativeElementNotFound(_)
                | Self::Fetch(_)
        )
    }
}
