//! Renderer lifecycle phases.

use serde::Serialize;

/// Lifecycle phase of a renderer.
///
/// The main line is `Constructing → Constructed → Main → Completing → Ended →
/// Destroyed`. `BgFadeIn`, `BgFadeOut` and `MediaFinished` are auxiliary
/// phases entered from `Main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RendererPhase {
    /// Asynchronous setup in progress.
    Constructing,
    /// Ready to start.
    Constructed,
    /// Playing, behaviours running.
    Main,
    /// Completion behaviours running.
    Completing,
    /// Cleaned up; may be restarted or destroyed.
    Ended,
    /// Resources released. Terminal.
    Destroyed,
    /// Background audio fading in.
    BgFadeIn,
    /// Background audio fading out.
    BgFadeOut,
    /// Media done, completion not yet started.
    MediaFinished,
}

impl RendererPhase {
    /// `Main` or one of its auxiliary phases, i.e. the renderer is live.
    #[must_use]
    pub fn is_main(self) -> bool {
        matches!(
            self,
            Self::Main | Self::BgFadeIn | Self::BgFadeOut | Self::MediaFinished
        )
    }

    /// Whether the media has finished playing.
    #[must_use]
    pub fn has_media_ended(self) -> bool {
        matches!(
            self,
            Self::MediaFinished | Self::Completing | Self::Ended | Self::Destroyed
        )
    }

    /// Whether further `end()` calls are no-ops.
    #[must_use]
    pub fn is_ended(self) -> bool {
        matches!(self, Self::Ended | Self::Destroyed)
    }
}
