//! Story documents and the in-memory fetchers and reasoner over them.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use storyplayer_core::error::PlayerError;
use storyplayer_core::fetchers::{Fetchers, MediaOptions, RepresentationReasoner};
use storyplayer_core::model::{
    AssetCollection, NarrativeElement, Representation, RepresentationCollection, Story, StoryMeta,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::HeadlessError;

/// A complete story in one JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryDocument {
    /// Story identifier.
    pub story_id: Uuid,
    /// Story name.
    #[serde(default)]
    pub name: String,
    /// Presentation metadata.
    #[serde(default)]
    pub meta: StoryMeta,
    /// Element the walk starts from.
    pub start_narrative_element_id: Uuid,
    /// Every element of the story graph.
    pub narrative_elements: Vec<NarrativeElement>,
    /// Representation collections referenced by the elements.
    #[serde(default)]
    pub representation_collections: Vec<RepresentationCollection>,
    /// Asset collections referenced by the representations.
    #[serde(default)]
    pub asset_collections: Vec<AssetCollection>,
}

impl StoryDocument {
    /// Reads and validates a document from disk.
    ///
    /// # Errors
    ///
    /// Returns `HeadlessError::Io` if the file cannot be read, and the
    /// errors of [`StoryDocument::from_json`] otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HeadlessError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses and validates a document.
    ///
    /// # Errors
    ///
    /// Returns `HeadlessError::Parse` for malformed JSON and
    /// `HeadlessError::InvalidDocument` when the start element is missing.
    pub fn from_json(raw: &str) -> Result<Self, HeadlessError> {
        let document: Self = serde_json::from_str(raw)?;
        if !document
            .narrative_elements
            .iter()
            .any(|element| element.id == document.start_narrative_element_id)
        {
            return Err(HeadlessError::InvalidDocument(format!(
                "start narrative element {} is not in the story",
                document.start_narrative_element_id
            )));
        }
        Ok(document)
    }

    /// Story metadata as the fetchers serve it.
    #[must_use]
    pub fn story(&self) -> Story {
        Story {
            id: self.story_id,
            name: self.name.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// Fetchers answering from a loaded document. Media sources resolve to
/// `media://` URLs.
#[derive(Debug)]
pub struct DocumentFetchers {
    story: Story,
    representation_collections: HashMap<Uuid, RepresentationCollection>,
    asset_collections: HashMap<Uuid, AssetCollection>,
}

impl DocumentFetchers {
    /// Indexes the document's collections.
    #[must_use]
    pub fn new(document: &StoryDocument) -> Self {
        Self {
            story: document.story(),
            representation_collections: document
                .representation_collections
                .iter()
                .map(|collection| (collection.id, collection.clone()))
                .collect(),
            asset_collections: document
                .asset_collections
                .iter()
                .map(|collection| (collection.id, collection.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl Fetchers for DocumentFetchers {
    async fn story(&self, id: Uuid) -> Result<Story, PlayerError> {
        if id == self.story.id {
            Ok(self.story.clone())
        } else {
            Err(PlayerError::Fetch(format!("no story {id}")))
        }
    }

    async fn asset_collection(&self, id: Uuid) -> Result<AssetCollection, PlayerError> {
        self.asset_collections
            .get(&id)
            .cloned()
            .ok_or_else(|| PlayerError::Fetch(format!("no asset collection {id}")))
    }

    async fn media(&self, src: &str, options: MediaOptions) -> Result<String, PlayerError> {
        debug!(src, include_credentials = options.include_credentials, "resolving media");
        Ok(format!("media://{src}"))
    }

    async fn representation_collection(
        &self,
        id: Uuid,
    ) -> Result<RepresentationCollection, PlayerError> {
        self.representation_collections
            .get(&id)
            .cloned()
            .ok_or_else(|| PlayerError::Fetch(format!("no representation collection {id}")))
    }
}

/// Picks the first representation of every collection.
#[derive(Debug, Default)]
pub struct FirstRepresentationReasoner;

#[async_trait]
impl RepresentationReasoner for FirstRepresentationReasoner {
    async fn choose(
        &self,
        collection: &RepresentationCollection,
    ) -> Result<Representation, PlayerError> {
        collection
            .representations
            .first()
            .map(|entry| entry.representation.clone())
            .ok_or_else(|| {
                PlayerError::Fetch(format!(
                    "representation collection {} is empty",
                    collection.id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document_json(start: Uuid, element: Uuid) -> String {
        json!({
            "story_id": Uuid::new_v4(),
            "name": "demo",
            "start_narrative_element_id": start,
            "narrative_elements": [{ "id": element, "name": "intro" }],
        })
        .to_string()
    }

    #[test]
    fn test_from_json_accepts_minimal_document() {
        // Arrange
        let start = Uuid::new_v4();

        // Act
        let document = StoryDocument::from_json(&document_json(start, start)).unwrap();

        // Assert
        assert_eq!(document.start_narrative_element_id, start);
        assert_eq!(document.narrative_elements.len(), 1);
        assert!(document.representation_collections.is_empty());
        assert_eq!(document.story().name, "demo");
    }

    #[test]
    fn test_from_json_rejects_missing_start_element() {
        // Act
        let result = StoryDocument::from_json(&document_json(Uuid::new_v4(), Uuid::new_v4()));

        // Assert
        assert!(matches!(result, Err(HeadlessError::InvalidDocument(_))));
    }

    #[test]
    fn test_from_json_rejects_malformed_json() {
        // Act
        let result = StoryDocument::from_json("{ not json");

        // Assert
        assert!(matches!(result, Err(HeadlessError::Parse(_))));
    }

    #[tokio::test]
    async fn test_fetchers_serve_document_story_and_reject_others() {
        // Arrange
        let start = Uuid::new_v4();
        let document = StoryDocument::from_json(&document_json(start, start)).unwrap();
        let fetchers = DocumentFetchers::new(&document);

        // Act
        let story = fetchers.story(document.story_id).await.unwrap();
        let missing = fetchers.story(Uuid::new_v4()).await;
        let url = fetchers
            .media("clip.mp4", MediaOptions::default())
            .await
            .unwrap();

        // Assert
        assert_eq!(story.id, document.story_id);
        assert!(matches!(missing, Err(PlayerError::Fetch(_))));
        assert_eq!(url, "media://clip.mp4");
    }
}
