//! In-memory fetchers with gates and failure injection, and a stub reasoner.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storyplayer_core::error::PlayerError;
use storyplayer_core::fetchers::{Fetchers, MediaOptions, RepresentationReasoner};
use storyplayer_core::model::{
    AssetCollection, Representation, RepresentationCollection, Story,
};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Gate {
    open: AtomicBool,
    notify: Notify,
}

/// Holds fetches of one id in flight until released.
#[derive(Debug, Clone)]
pub struct FetchGate {
    gate: Arc<Gate>,
}

impl FetchGate {
    /// Lets every held and future fetch through.
    pub fn release(&self) {
        self.gate.open.store(true, Ordering::SeqCst);
        self.gate.notify.notify_waiters();
    }
}

/// Fetchers backed by maps filled in by the test.
///
/// Media sources resolve to `https://media.test/<src>`.
#[derive(Debug, Default)]
pub struct InMemoryFetchers {
    stories: Mutex<HashMap<Uuid, Story>>,
    asset_collections: Mutex<HashMap<Uuid, AssetCollection>>,
    representation_collections: Mutex<HashMap<Uuid, RepresentationCollection>>,
    gates: Mutex<HashMap<Uuid, Arc<Gate>>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl InMemoryFetchers {
    /// Create empty fetchers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a story.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_story(&self, story: Story) {
        self.stories.lock().unwrap().insert(story.id, story);
    }

    /// Registers an asset collection.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_asset_collection(&self, collection: AssetCollection) {
        self.asset_collections
            .lock()
            .unwrap()
            .insert(collection.id, collection);
    }

    /// Registers a representation collection.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_representation_collection(&self, collection: RepresentationCollection) {
        self.representation_collections
            .lock()
            .unwrap()
            .insert(collection.id, collection);
    }

    /// Holds every fetch of `id` until the returned gate is released.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn hold(&self, id: Uuid) -> FetchGate {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(id, Arc::clone(&gate));
        FetchGate { gate }
    }

    /// Makes every fetch of `id` fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail(&self, id: Uuid) {
        self.failing.lock().unwrap().insert(id);
    }

    async fn pass_gate(&self, id: Uuid) -> Result<(), PlayerError> {
        let gate = self.gates.lock().unwrap().get(&id).cloned();
        if let Some(gate) = gate {
            let released = gate.notify.notified();
            if !gate.open.load(Ordering::SeqCst) {
                released.await;
            }
        }
        if self.failing.lock().unwrap().contains(&id) {
            return Err(PlayerError::Fetch(format!("fetch of {id} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl Fetchers for InMemoryFetchers {
    async fn story(&self, id: Uuid) -> Result<Story, PlayerError> {
        self.pass_gate(id).await?;
        self.stories
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| PlayerError::Fetch(format!("no story {id}")))
    }

    async fn asset_collection(&self, id: Uuid) -> Result<AssetCollection, PlayerError> {
        self.pass_gate(id).await?;
        self.asset_collections
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| PlayerError::Fetch(format!("no asset collection {id}")))
    }

    async fn media(&self, src: &str, _options: MediaOptions) -> Result<String, PlayerError> {
        Ok(format!("https://media.test/{src}"))
    }

    async fn representation_collection(
        &self,
        id: Uuid,
    ) -> Result<RepresentationCollection, PlayerError> {
        self.pass_gate(id).await?;
        self.representation_collections
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| PlayerError::Fetch(format!("no representation collection {id}")))
    }
}

/// A reasoner that always picks the first representation.
#[derive(Debug, Default)]
pub struct StubReasoner;

#[async_trait]
impl RepresentationReasoner for StubReasoner {
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
