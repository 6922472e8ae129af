//! Headless driver error types.

use storyplayer_core::error::PlayerError;
use thiserror::Error;

/// Startup and run errors for the headless driver.
#[derive(Debug, Error)]
pub enum HeadlessError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The story document could not be read.
    #[error("could not read story document: {0}")]
    Io(#[from] std::io::Error),

    /// The story document is not valid JSON for the story format.
    #[error("could not parse story document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The story document parsed but is inconsistent.
    #[error("invalid story document: {0}")]
    InvalidDocument(String),

    /// The render core reported an error.
    #[error(transparent)]
    Player(#[from] PlayerError),
}
