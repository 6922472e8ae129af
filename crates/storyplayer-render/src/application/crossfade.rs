//! Background audio crossfade scheduling.
//!
//! Background sources that the next likely element does not need are faded
//! out so the fade ends exactly when the current foreground ends. Sources
//! that carry on are left playing and any pending fade is cancelled.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use storyplayer_core::fetchers::Fetchers;
use storyplayer_core::model::AssetCollection;
use storyplayer_core::player::Player;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::background::BackgroundRenderer;
use crate::domain::renderer::{PlaybackTime, Renderer};

/// How a background source should fade out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadePlan {
    /// Start now, lasting `secs`.
    Immediate {
        /// Fade length in seconds.
        secs: f64,
    },
    /// Start at `start_time` on the foreground clock, lasting `secs`.
    Scheduled {
        /// Foreground position at which to start.
        start_time: f64,
        /// Fade length in seconds.
        secs: f64,
    },
}

/// Plans a fade that ends with the foreground. Returns `None` when the
/// foreground has no end.
#[must_use]
pub fn plan_fade(time: &PlaybackTime, fade_secs: f64) -> Option<FadePlan> {
    let remaining = time.remaining_time?;
    if remaining < fade_secs {
        Some(FadePlan::Immediate { secs: remaining })
    } else {
        Some(FadePlan::Scheduled {
            start_time: time.current_time + (remaining - fade_secs),
            secs: fade_secs,
        })
    }
}

/// A background asset collection with its source key.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSource {
    /// Audio source, used as the playout key.
    pub key: String,
    /// The collection it came from.
    pub collection: AssetCollection,
}

/// Background renderers that are playing, and ones prepared for upcoming
/// elements.
#[derive(Debug, Default)]
pub struct BackgroundRegistry {
    active: BTreeMap<String, Arc<BackgroundRenderer>>,
    pending: BTreeMap<String, Arc<BackgroundRenderer>>,
}

impl BackgroundRegistry {
    /// Keys of playing backgrounds.
    #[must_use]
    pub fn active_keys(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    /// Keys of prepared backgrounds.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Playing backgrounds.
    #[must_use]
    pub fn active(&self) -> Vec<Arc<BackgroundRenderer>> {
        self.active.values().cloned().collect()
    }

    /// Empties both maps, returning every distinct renderer.
    pub fn drain(&mut self) -> Vec<Arc<BackgroundRenderer>> {
        let mut renderers: Vec<_> = std::mem::take(&mut self.active).into_values().collect();
        for pending in std::mem::take(&mut self.pending).into_values() {
            if !renderers.iter().any(|active| Arc::ptr_eq(active, &pending)) {
                renderers.push(pending);
            }
        }
        renderers
    }
}

/// Change set computed for the backgrounds of a new foreground.
#[derive(Debug, Default)]
pub struct BackgroundChanges {
    /// No longer needed; destroy.
    pub stopped: Vec<Arc<BackgroundRenderer>>,
    /// Newly active; start.
    pub started: Vec<Arc<BackgroundRenderer>>,
    /// Already active and still needed; cancel any fade.
    pub kept: Vec<Arc<BackgroundRenderer>>,
}

/// Builds, starts and fades background renderers.
pub struct CrossfadeScheduler {
    fetchers: Arc<dyn Fetchers>,
    player: Arc<dyn Player>,
    fade_secs: f64,
}

impl CrossfadeScheduler {
    /// Create a scheduler fading over `fade_secs`.
    #[must_use]
    pub fn new(fetchers: Arc<dyn Fetchers>, player: Arc<dyn Player>, fade_secs: f64) -> Self {
        Self {
            fetchers,
            player,
            fade_secs,
        }
    }

    /// Fetches background asset collections in parallel. Failures and
    /// collections without audio are logged and left out.
    pub async fn resolve_sources(&self, ids: &[Uuid]) -> Vec<BackgroundSource> {
        let results = join_all(ids.iter().map(|id| self.fetchers.asset_collection(*id))).await;
        let mut sources: Vec<BackgroundSource> = Vec::new();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(collection) => match collection.assets.audio_src.clone() {
                    Some(key) if !sources.iter().any(|source| source.key == key) => {
                        sources.push(BackgroundSource { key, collection });
                    }
                    Some(_) => {}
                    None => {
                        debug!(asset_collection_id = %id, "background collection has no audio source");
                    }
                },
                Err(error) => {
                    warn!(asset_collection_id = %id, %error, "could not fetch background asset collection");
                }
            }
        }
        sources
    }

    /// Works out which backgrounds stop, start or carry on when the
    /// foreground needs exactly `sources`. Newly needed sources are taken
    /// from the prepared set when possible.
    pub fn reconcile_active(
        &self,
        registry: &mut BackgroundRegistry,
        sources: &[BackgroundSource],
    ) -> BackgroundChanges {
        let needed: BTreeSet<&str> = sources.iter().map(|source| source.key.as_str()).collect();
        let mut changes = BackgroundChanges::default();

        let dead: Vec<String> = registry
            .active
            .keys()
            .filter(|key| !needed.contains(key.as_str()))
            .cloned()
            .collect();
        for key in dead {
            if let Some(renderer) = registry.active.remove(&key) {
                if registry
                    .pending
                    .get(&key)
                    .is_some_and(|pending| Arc::ptr_eq(pending, &renderer))
                {
                    registry.pending.remove(&key);
                }
                changes.stopped.push(renderer);
            }
        }

        for source in sources {
            if let Some(active) = registry.active.get(&source.key) {
                changes.kept.push(Arc::clone(active));
                continue;
            }
            let renderer = registry
                .pending
                .get(&source.key)
                .cloned()
                .or_else(|| self.build(&source.collection));
            if let Some(renderer) = renderer {
                registry
                    .active
                    .insert(source.key.clone(), Arc::clone(&renderer));
                changes.started.push(renderer);
            }
        }
        changes
    }

    /// Prepares renderers for every source upcoming elements need and drops
    /// prepared ones nothing needs any more.
    pub fn reconcile_pending(
        &self,
        registry: &mut BackgroundRegistry,
        sources: &[BackgroundSource],
    ) -> Vec<Arc<BackgroundRenderer>> {
        for source in sources {
            if registry.pending.contains_key(&source.key) {
                continue;
            }
            let renderer = registry
                .active
                .get(&source.key)
                .cloned()
                .or_else(|| self.build(&source.collection));
            if let Some(renderer) = renderer {
                registry.pending.insert(source.key.clone(), renderer);
            }
        }

        let needed: BTreeSet<&str> = sources.iter().map(|source| source.key.as_str()).collect();
        let unused: Vec<String> = registry
            .pending
            .keys()
            .filter(|key| !needed.contains(key.as_str()))
            .cloned()
            .collect();
        let mut dropped = Vec::new();
        for key in unused {
            if let Some(renderer) = registry.pending.remove(&key) {
                let playing = registry
                    .active
                    .values()
                    .any(|active| Arc::ptr_eq(active, &renderer));
                if !playing {
                    dropped.push(renderer);
                }
            }
        }
        dropped
    }

    /// Fades out every playing background whose key is not in
    /// `forward_keys`, timed against `current`; cancels fades for the rest.
    pub fn apply_fades(
        &self,
        active: &[Arc<BackgroundRenderer>],
        current: &Renderer,
        forward_keys: &BTreeSet<String>,
    ) {
        for background in active {
            let key = background.key();
            if forward_keys.contains(key) {
                background.cancel_fade();
                current.remove_time_event(key);
                continue;
            }
            match plan_fade(&current.current_time(), self.fade_secs) {
                Some(FadePlan::Immediate { secs }) => {
                    debug!(key, secs, "foreground nearly over; fading background now");
                    background.fade_out(secs);
                }
                Some(FadePlan::Scheduled { start_time, secs }) => {
                    debug!(key, start_time, secs, "scheduling background fade");
                    let weak = Arc::downgrade(background);
                    current.add_time_event(
                        key,
                        start_time,
                        Arc::new(move || {
                            if let Some(background) = weak.upgrade() {
                                background.fade_out(secs);
                            }
                            Ok(())
                        }),
                        None,
                        None,
                    );
                }
                None => {
                    debug!(key, "foreground has no end; background fade not scheduled");
                }
            }
        }
    }

    /// Pauses or resumes playing backgrounds and their fades.
    pub fn set_playing(&self, active: &[Arc<BackgroundRenderer>], playing: bool) {
        if playing {
            self.player.play_backgrounds();
        } else {
            self.player.pause_backgrounds();
        }
        for background in active {
            if playing {
                background.resume_fade();
            } else {
                background.pause_fade();
            }
        }
    }

    fn build(&self, collection: &AssetCollection) -> Option<Arc<BackgroundRenderer>> {
        BackgroundRenderer::create(
            collection,
            Arc::clone(&self.fetchers),
            Arc::clone(&self.player),
        )
    }
}
