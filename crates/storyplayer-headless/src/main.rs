//! Story Player headless driver entry point.

use std::error::Error;

use storyplayer_core::config::PlayerConfig;
use storyplayer_headless::document::StoryDocument;
use storyplayer_headless::driver::{DriverOptions, HeadlessDriver};
use storyplayer_headless::error::HeadlessError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Read configuration from the command line and environment.
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STORY_PATH").ok())
        .ok_or_else(|| {
            HeadlessError::Config(
                "pass a story document path or set STORY_PATH".to_string(),
            )
        })?;
    let mut options = DriverOptions::default();
    if let Ok(raw) = std::env::var("MAX_STEPS") {
        options.max_steps = raw
            .parse()
            .map_err(|e| HeadlessError::Config(format!("MAX_STEPS must be a valid usize: {e}")))?;
    }
    if let Ok(raw) = std::env::var("PLAYBACK_RATE") {
        options.playback_rate = raw
            .parse()
            .map_err(|e| HeadlessError::Config(format!("PLAYBACK_RATE must be a number: {e}")))?;
    }
    let config = PlayerConfig::from_env().map_err(HeadlessError::from)?;

    tracing::info!(%path, "Loading story document");
    let document = StoryDocument::load(&path)?;

    let summary = HeadlessDriver::new(document, config, options).run().await?;
    tracing::info!(steps = summary.visited.len(), end = ?summary.end, "Story walk complete");

    Ok(())
}
