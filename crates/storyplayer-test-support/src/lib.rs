//! Shared test mocks and utilities for the story player.

mod analytics;
mod controller;
mod fetchers;
mod fixtures;
mod player;

pub use analytics::RecordingAnalytics;
pub use controller::StubController;
pub use fetchers::{FetchGate, InMemoryFetchers, StubReasoner};
pub use fixtures::{
    StoryFixture, behaviour, looping_audio, media_collection, narrative_element, representation,
    video,
};
pub use player::{PlayerCall, RecordingPlayer};
