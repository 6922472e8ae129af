//! Fetcher and reasoner contracts.

use async_trait::async_trait;

use uuid::Uuid;

use crate::error::PlayerError;
use crate::model::{AssetCollection, Representation, RepresentationCollection, Story};

/// Options passed to the media fetcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaOptions {
    /// Send credentials with the media request.
    pub include_credentials: bool,
}

/// Resolves story documents and media by id. Every call may reject.
#[async_trait]
pub trait Fetchers: Send + Sync {
    /// Fetches story metadata.
    async fn story(&self, id: Uuid) -> Result<Story, PlayerError>;

    /// Fetches an asset collection.
    async fn asset_collection(&self, id: Uuid) -> Result<AssetCollection, PlayerError>;

    /// Resolves a media source to a playable URL.
    async fn media(&self, src: &str, options: MediaOptions) -> Result<String, PlayerError>;

    /// Fetches a representation collection.
    async fn representation_collection(
        &self,
        id: Uuid,
    ) -> Result<RepresentationCollection, PlayerError>;
}

/// Picks the representation to show from a collection. Deterministic for a
/// given variable and device state.
#[async_trait]
pub trait RepresentationReasoner: Send + Sync {
    /// Chooses a representation.
    async fn choose(
        &self,
        collection: &RepresentationCollection,
    ) -> Result<Representation, PlayerError>;
}
