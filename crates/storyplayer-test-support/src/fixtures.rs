//! Model builders and a ready-wired set of collaborators.

use std::sync::Arc;

use serde_json::Value;
use storyplayer_core::behaviour::{BehaviourDefinition, BehaviourKind, BehaviourSet};
use storyplayer_core::model::{
    AssetCollection, Assets, LOOPING_AUDIO_COLLECTION_TYPE, Link, NarrativeElement,
    NarrativeElementBody, Representation, RepresentationAssets, RepresentationCollection,
    RepresentationEntry, RepresentationKind,
};
use uuid::Uuid;

use crate::{InMemoryFetchers, RecordingAnalytics, RecordingPlayer, StubController, StubReasoner};

/// A bare representation of `kind`.
#[must_use]
pub fn representation(kind: RepresentationKind, duration: Option<f64>) -> Representation {
    Representation {
        id: Uuid::new_v4(),
        name: "test representation".to_owned(),
        representation_type: kind,
        duration,
        asset_collections: RepresentationAssets::default(),
        behaviours: BehaviourSet::default(),
        choices: Vec::new(),
    }
}

/// A video representation of `duration` seconds.
#[must_use]
pub fn video(duration: f64) -> Representation {
    representation(RepresentationKind::Video, Some(duration))
}

/// A behaviour definition with parameters taken from a JSON object.
#[must_use]
pub fn behaviour(kind: BehaviourKind, params: Value) -> BehaviourDefinition {
    BehaviourDefinition {
        id: Uuid::new_v4(),
        kind,
        params: match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
    }
}

/// A narrative element pointing at a representation collection, with one
/// link per target.
#[must_use]
pub fn narrative_element(id: Uuid, collection_id: Uuid, targets: &[Uuid]) -> NarrativeElement {
    NarrativeElement {
        id,
        name: format!("element {id}"),
        body: NarrativeElementBody {
            representation_collection_target_id: Some(collection_id),
        },
        links: targets
            .iter()
            .map(|target| Link {
                target_narrative_element_id: Some(*target),
                override_as_chosen: None,
            })
            .collect(),
    }
}

/// A looping audio asset collection for `src`.
#[must_use]
pub fn looping_audio(src: &str) -> AssetCollection {
    AssetCollection {
        id: Uuid::new_v4(),
        asset_collection_type: LOOPING_AUDIO_COLLECTION_TYPE.to_owned(),
        assets: Assets {
            audio_src: Some(src.to_owned()),
            ..Assets::default()
        },
    }
}

/// An asset collection whose every source is `src`.
#[must_use]
pub fn media_collection(src: &str) -> AssetCollection {
    AssetCollection {
        id: Uuid::new_v4(),
        asset_collection_type: "urn:x-object-based-media:asset-collection-types:media/v1.0"
            .to_owned(),
        assets: Assets {
            audio_src: Some(src.to_owned()),
            image_src: Some(src.to_owned()),
            av_src: Some(src.to_owned()),
        },
    }
}

/// Recording collaborators sharing one in-memory story.
#[derive(Debug, Clone, Default)]
pub struct StoryFixture {
    /// Narrative graph.
    pub controller: Arc<StubController>,
    /// Story data.
    pub fetchers: Arc<InMemoryFetchers>,
    /// Player boundary.
    pub player: Arc<RecordingPlayer>,
    /// Analytics sink.
    pub analytics: Arc<RecordingAnalytics>,
    /// Representation choice.
    pub reasoner: Arc<StubReasoner>,
}

impl StoryFixture {
    /// Create a fixture with an empty story.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element with a single-representation collection and returns
    /// it. The representation collection id is fresh.
    pub fn add_element(
        &self,
        id: Uuid,
        representation: Representation,
        targets: &[Uuid],
    ) -> NarrativeElement {
        let collection_id = Uuid::new_v4();
        self.fetchers
            .add_representation_collection(RepresentationCollection {
                id: collection_id,
                representations: vec![RepresentationEntry { representation }],
            });
        let element = narrative_element(id, collection_id, targets);
        self.controller.insert(element.clone());
        element
    }

    /// Registers a looping background source and returns its collection id.
    pub fn add_background(&self, src: &str) -> Uuid {
        let collection = looping_audio(src);
        let id = collection.id;
        self.fetchers.add_asset_collection(collection);
        id
    }
}
