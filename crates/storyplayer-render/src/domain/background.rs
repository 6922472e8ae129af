//! Background audio renderers.
//!
//! One renderer per looping audio source. The source string doubles as the
//! playout key, so two representations sharing a source share the renderer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storyplayer_core::error::PlayerError;
use storyplayer_core::fetchers::{Fetchers, MediaOptions};
use storyplayer_core::model::{AssetCollection, LOOPING_AUDIO_COLLECTION_TYPE};
use storyplayer_core::player::Player;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::phase::RendererPhase;

struct BackgroundInner {
    phase: RendererPhase,
    url: Option<String>,
}

/// Plays one looping background audio source.
pub struct BackgroundRenderer {
    key: String,
    asset_collection_id: Uuid,
    fetchers: Arc<dyn Fetchers>,
    player: Arc<dyn Player>,
    inner: Mutex<BackgroundInner>,
}

impl std::fmt::Debug for BackgroundRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRenderer")
            .field("key", &self.key)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl BackgroundRenderer {
    /// Builds a renderer for a background asset collection. Only looping
    /// audio collections are supported; anything else is logged and `None`
    /// is returned.
    #[must_use]
    pub fn create(
        collection: &AssetCollection,
        fetchers: Arc<dyn Fetchers>,
        player: Arc<dyn Player>,
    ) -> Option<Arc<Self>> {
        if collection.asset_collection_type != LOOPING_AUDIO_COLLECTION_TYPE {
            error!(
                asset_collection_id = %collection.id,
                asset_collection_type = %collection.asset_collection_type,
                "no background renderer for asset collection type"
            );
            return None;
        }
        let Some(key) = collection.assets.audio_src.clone() else {
            warn!(asset_collection_id = %collection.id, "background collection has no audio source");
            return None;
        };
        Some(Arc::new(Self {
            key,
            asset_collection_id: collection.id,
            fetchers,
            player,
            inner: Mutex::new(BackgroundInner {
                phase: RendererPhase::Constructing,
                url: None,
            }),
        }))
    }

    /// Source key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Asset collection the source came from.
    #[must_use]
    pub fn asset_collection_id(&self) -> Uuid {
        self.asset_collection_id
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RendererPhase {
        self.lock().phase
    }

    /// Resolves the media URL ahead of playback.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Fetch` when the media fetcher rejects.
    pub async fn prepare(&self) -> Result<String, PlayerError> {
        if let Some(url) = self.lock().url.clone() {
            return Ok(url);
        }
        let url = self
            .fetchers
            .media(&self.key, MediaOptions::default())
            .await?;
        let mut inner = self.lock();
        inner.url = Some(url.clone());
        if inner.phase == RendererPhase::Constructing {
            inner.phase = RendererPhase::Constructed;
        }
        Ok(url)
    }

    /// Starts playback, resolving the media first if needed.
    pub async fn start(&self) {
        let url = match self.prepare().await {
            Ok(url) => url,
            Err(error) => {
                error!(key = %self.key, %error, "could not start background audio");
                return;
            }
        };
        {
            let mut inner = self.lock();
            if matches!(inner.phase, RendererPhase::Destroyed) || inner.phase.is_main() {
                debug!(key = %self.key, phase = ?inner.phase, "background start ignored");
                return;
            }
            inner.phase = RendererPhase::Main;
        }
        self.player.start_background(&self.key, &url);
        debug!(key = %self.key, "background audio started");
    }

    /// Fades out over `secs`.
    pub fn fade_out(&self, secs: f64) {
        {
            let mut inner = self.lock();
            if !inner.phase.is_main() {
                debug!(key = %self.key, phase = ?inner.phase, "fade out on idle background ignored");
                return;
            }
            inner.phase = RendererPhase::BgFadeOut;
        }
        debug!(key = %self.key, secs, "fading out background audio");
        self.player.fade_out_background(&self.key, secs);
    }

    /// Cancels a fade in progress and restores full volume.
    pub fn cancel_fade(&self) {
        {
            let mut inner = self.lock();
            if inner.phase != RendererPhase::BgFadeOut {
                return;
            }
            inner.phase = RendererPhase::Main;
        }
        self.player.cancel_background_fade(&self.key);
    }

    /// Pauses a fade in progress.
    pub fn pause_fade(&self) {
        if self.phase() == RendererPhase::BgFadeOut {
            self.player.pause_background_fade(&self.key);
        }
    }

    /// Resumes a paused fade.
    pub fn resume_fade(&self) {
        if self.phase() == RendererPhase::BgFadeOut {
            self.player.resume_background_fade(&self.key);
        }
    }

    /// Stops playback. Returns `false` when already destroyed.
    pub fn destroy(&self) -> bool {
        let was_playing = {
            let mut inner = self.lock();
            if inner.phase == RendererPhase::Destroyed {
                return false;
            }
            let was_playing = inner.phase.is_main();
            inner.phase = RendererPhase::Destroyed;
            was_playing
        };
        if was_playing {
            self.player.stop_background(&self.key);
        }
        debug!(key = %self.key, "background audio destroyed");
        true
    }

    fn lock(&self) -> MutexGuard<'_, BackgroundInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use storyplayer_core::model::Assets;
    use storyplayer_test_support::{InMemoryFetchers, PlayerCall, RecordingPlayer};
    use super::*;

    fn looping(src: &str) -> AssetCollection {
        AssetCollection {
            id: Uuid::new_v4(),
            asset_collection_type: LOOPING_AUDIO_COLLECTION_TYPE.to_owned(),
            assets: Assets {
                audio_src: Some(src.to_owned()),
                ..Assets::default()
            },
        }
    }

    #[test]
    fn test_create_rejects_other_collection_types() {
        // Arrange
        let mut collection = looping("bg1.mp3");
        collection.asset_collection_type = "urn:example:still-image".to_owned();

        // Act
        let renderer = BackgroundRenderer::create(
            &collection,
            Arc::new(InMemoryFetchers::new()),
            Arc::new(RecordingPlayer::new()),
        );

        // Assert
        assert!(renderer.is_none());
    }

    #[tokio::test]
    async fn test_fade_out_then_cancel_restores_main() {
        // Arrange
        let player = Arc::new(RecordingPlayer::new());
        let renderer = BackgroundRenderer::create(
            &looping("bg1.mp3"),
            Arc::new(InMemoryFetchers::new()),
            player.clone(),
        )
        .unwrap();
        renderer.start().await;

        // Act
        renderer.fade_out(2.0);
        let fading = renderer.phase();
        renderer.cancel_fade();

        // Assert
        assert_eq!(fading, RendererPhase::BgFadeOut);
        assert_eq!(renderer.phase(), RendererPhase::Main);
        let calls = player.calls();
        assert!(calls.contains(&PlayerCall::FadeOutBackground {
            key: "bg1.mp3".to_owned(),
            secs: 2.0,
        }));
        assert!(calls.contains(&PlayerCall::CancelBackgroundFade("bg1.mp3".to_owned())));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_stops_once() {
        // Arrange
        let player = Arc::new(RecordingPlayer::new());
        let renderer = BackgroundRenderer::create(
            &looping("bg1.mp3"),
            Arc::new(InMemoryFetchers::new()),
            player.clone(),
        )
        .unwrap();
        renderer.start().await;

        // Act
        let first = renderer.destroy();
        let second = renderer.destroy();

        // Assert
        assert!(first);
        assert!(!second);
        let stops = player
            .calls()
            .into_iter()
            .filter(|call| matches!(call, PlayerCall::StopBackground(_)))
            .count();
        assert_eq!(stops, 1);
    }
}
