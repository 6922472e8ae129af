//! Recording player boundary.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use storyplayer_core::behaviour::BehaviourDefinition;
use storyplayer_core::error::PlayerError;
use storyplayer_core::model::LaunchConfig;
use storyplayer_core::player::{LinkChoicePresentation, Player};
use uuid::Uuid;

/// One call made against the player boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    QueueMedia { renderer_id: Uuid, url: String },
    UnqueueMedia(Uuid),
    SetPlayoutActive(Uuid),
    SetPlayoutInactive(Uuid),
    Play,
    Pause,
    SetCurrentTime { renderer_id: Uuid, time: f64 },
    StartBackground { key: String, url: String },
    StopBackground(String),
    FadeInBackground { key: String, secs: f64 },
    FadeOutBackground { key: String, secs: f64 },
    CancelBackgroundFade(String),
    PauseBackgroundFade(String),
    ResumeBackgroundFade(String),
    PauseBackgrounds,
    PlayBackgrounds,
    EnableControls,
    DisableControls,
    SetBackAvailable(bool),
    SetNextAvailable(bool),
    ShowSeekButtons,
    HideSeekButtons,
    ConnectScrubBar(Uuid),
    DisconnectScrubBar(Uuid),
    EnterCompleteBehaviourPhase,
    ExitCompleteBehaviourPhase,
    SetVolumeControlLevel { label: String, value: f64 },
    PresentBehaviour { renderer_id: Uuid, behaviour_id: Uuid, media_url: Option<String> },
    ClearBehaviour { renderer_id: Uuid, behaviour_id: Uuid },
    ClearBehaviourElements(Uuid),
    ShowLinkChoices { renderer_id: Uuid, presentation: LinkChoicePresentation },
    ClearLinkChoices,
    ShowStartScreen { art_url: Option<String> },
    ExitVr,
}

/// A player that records every call and reports scripted positions.
///
/// User interaction counts as started from the outset so that timed events
/// fire; tests that need the opposite call
/// [`RecordingPlayer::set_user_interaction_started`].
#[derive(Debug)]
pub struct RecordingPlayer {
    calls: Mutex<Vec<PlayerCall>>,
    positions: Mutex<HashMap<Uuid, f64>>,
    durations: Mutex<HashMap<Uuid, f64>>,
    playing: AtomicBool,
    interaction_started: AtomicBool,
    in_vr: AtomicBool,
    fail_clears: AtomicBool,
}

impl Default for RecordingPlayer {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            positions: Mutex::new(HashMap::new()),
            durations: Mutex::new(HashMap::new()),
            playing: AtomicBool::new(true),
            interaction_started: AtomicBool::new(true),
            in_vr: AtomicBool::new(false),
            fail_clears: AtomicBool::new(false),
        }
    }
}

impl RecordingPlayer {
    /// Create a player with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every call made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Counts calls matching `predicate`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn count(&self, predicate: impl Fn(&PlayerCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Forgets every recorded call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Sets the playback position reported for a renderer.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_position(&self, renderer_id: Uuid, time: f64) {
        self.positions.lock().unwrap().insert(renderer_id, time);
    }

    /// Sets the media duration reported for a renderer.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_duration(&self, renderer_id: Uuid, duration: f64) {
        self.durations.lock().unwrap().insert(renderer_id, duration);
    }

    /// Controls whether the user is considered to have interacted.
    pub fn set_user_interaction_started(&self, started: bool) {
        self.interaction_started.store(started, Ordering::SeqCst);
    }

    /// Controls whether VR mode is reported as on.
    pub fn set_in_vr(&self, in_vr: bool) {
        self.in_vr.store(in_vr, Ordering::SeqCst);
    }

    /// Makes every `clear_behaviour` call fail.
    pub fn fail_behaviour_clears(&self) {
        self.fail_clears.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: PlayerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Player for RecordingPlayer {
    fn queue_media(&self, renderer_id: Uuid, url: &str) {
        self.record(PlayerCall::QueueMedia {
            renderer_id,
            url: url.to_owned(),
        });
    }

    fn unqueue_media(&self, renderer_id: Uuid) {
        self.record(PlayerCall::UnqueueMedia(renderer_id));
    }

    fn set_playout_active(&self, renderer_id: Uuid) {
        self.record(PlayerCall::SetPlayoutActive(renderer_id));
    }

    fn set_playout_inactive(&self, renderer_id: Uuid) {
        self.record(PlayerCall::SetPlayoutInactive(renderer_id));
    }

    fn play(&self) {
        self.playing.store(true, Ordering::SeqCst);
        self.record(PlayerCall::Play);
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.record(PlayerCall::Pause);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn has_started(&self) -> bool {
        self.interaction_started.load(Ordering::SeqCst)
    }

    fn user_interaction_started(&self) -> bool {
        self.interaction_started.load(Ordering::SeqCst)
    }

    fn current_time(&self, renderer_id: Uuid) -> Option<f64> {
        self.positions.lock().unwrap().get(&renderer_id).copied()
    }

    fn duration(&self, renderer_id: Uuid) -> Option<f64> {
        self.durations.lock().unwrap().get(&renderer_id).copied()
    }

    fn set_current_time(&self, renderer_id: Uuid, time: f64) {
        self.positions.lock().unwrap().insert(renderer_id, time);
        self.record(PlayerCall::SetCurrentTime { renderer_id, time });
    }

    fn start_background(&self, key: &str, url: &str) {
        self.record(PlayerCall::StartBackground {
            key: key.to_owned(),
            url: url.to_owned(),
        });
    }

    fn stop_background(&self, key: &str) {
        self.record(PlayerCall::StopBackground(key.to_owned()));
    }

    fn fade_in_background(&self, key: &str, secs: f64) {
        self.record(PlayerCall::FadeInBackground {
            key: key.to_owned(),
            secs,
        });
    }

    fn fade_out_background(&self, key: &str, secs: f64) {
        self.record(PlayerCall::FadeOutBackground {
            key: key.to_owned(),
            secs,
        });
    }

    fn cancel_background_fade(&self, key: &str) {
        self.record(PlayerCall::CancelBackgroundFade(key.to_owned()));
    }

    fn pause_background_fade(&self, key: &str) {
        self.record(PlayerCall::PauseBackgroundFade(key.to_owned()));
    }

    fn resume_background_fade(&self, key: &str) {
        self.record(PlayerCall::ResumeBackgroundFade(key.to_owned()));
    }

    fn pause_backgrounds(&self) {
        self.record(PlayerCall::PauseBackgrounds);
    }

    fn play_backgrounds(&self) {
        self.record(PlayerCall::PlayBackgrounds);
    }

    fn enable_controls(&self) {
        self.record(PlayerCall::EnableControls);
    }

    fn disable_controls(&self) {
        self.record(PlayerCall::DisableControls);
    }

    fn set_back_available(&self, available: bool) {
        self.record(PlayerCall::SetBackAvailable(available));
    }

    fn set_next_available(&self, available: bool) {
        self.record(PlayerCall::SetNextAvailable(available));
    }

    fn show_seek_buttons(&self) {
        self.record(PlayerCall::ShowSeekButtons);
    }

    fn hide_seek_buttons(&self) {
        self.record(PlayerCall::HideSeekButtons);
    }

    fn connect_scrub_bar(&self, renderer_id: Uuid) {
        self.record(PlayerCall::ConnectScrubBar(renderer_id));
    }

    fn disconnect_scrub_bar(&self, renderer_id: Uuid) {
        self.record(PlayerCall::DisconnectScrubBar(renderer_id));
    }

    fn enter_complete_behaviour_phase(&self) {
        self.record(PlayerCall::EnterCompleteBehaviourPhase);
    }

    fn exit_complete_behaviour_phase(&self) {
        self.record(PlayerCall::ExitCompleteBehaviourPhase);
    }

    fn set_volume_control_level(&self, label: &str, value: f64) {
        self.record(PlayerCall::SetVolumeControlLevel {
            label: label.to_owned(),
            value,
        });
    }

    async fn present_behaviour(
        &self,
        renderer_id: Uuid,
        behaviour: &BehaviourDefinition,
        media_url: Option<String>,
    ) -> Result<(), PlayerError> {
        self.record(PlayerCall::PresentBehaviour {
            renderer_id,
            behaviour_id: behaviour.id,
            media_url,
        });
        Ok(())
    }

    fn clear_behaviour(&self, renderer_id: Uuid, behaviour_id: Uuid) -> Result<(), PlayerError> {
        self.record(PlayerCall::ClearBehaviour {
            renderer_id,
            behaviour_id,
        });
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(PlayerError::Behaviour(format!(
                "behaviour {behaviour_id} has no element to clear"
            )));
        }
        Ok(())
    }

    fn clear_behaviour_elements(&self, renderer_id: Uuid) -> Result<(), PlayerError> {
        self.record(PlayerCall::ClearBehaviourElements(renderer_id));
        Ok(())
    }

    fn show_link_choices(&self, renderer_id: Uuid, presentation: LinkChoicePresentation) {
        self.record(PlayerCall::ShowLinkChoices {
            renderer_id,
            presentation,
        });
    }

    fn clear_link_choices(&self) {
        self.record(PlayerCall::ClearLinkChoices);
    }

    fn show_start_screen(&self, _launch: &LaunchConfig, art_url: Option<String>) {
        self.record(PlayerCall::ShowStartScreen { art_url });
    }

    fn is_in_vr(&self) -> bool {
        self.in_vr.load(Ordering::SeqCst)
    }

    fn exit_vr(&self) {
        self.in_vr.store(false, Ordering::SeqCst);
        self.record(PlayerCall::ExitVr);
    }
}
