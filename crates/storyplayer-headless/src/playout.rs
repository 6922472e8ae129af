//! Simulated playout: a clock per renderer instead of real media.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use storyplayer_core::behaviour::BehaviourDefinition;
use storyplayer_core::error::PlayerError;
use storyplayer_core::model::LaunchConfig;
use storyplayer_core::player::{LinkChoicePresentation, Player};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug)]
struct PlayoutState {
    positions: HashMap<Uuid, f64>,
    active: Option<Uuid>,
    playing: bool,
    interaction_started: bool,
    link_choices: Option<LinkChoicePresentation>,
}

/// A player whose media positions only move when [`SimulatedPlayer::advance`]
/// is called. Behaviours finish as soon as they are presented.
#[derive(Debug)]
pub struct SimulatedPlayer {
    state: Mutex<PlayoutState>,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self {
            state: Mutex::new(PlayoutState {
                positions: HashMap::new(),
                active: None,
                playing: true,
                interaction_started: false,
                link_choices: None,
            }),
        }
    }
}

impl SimulatedPlayer {
    /// Creates a player that is waiting for the start button.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the user pressing start.
    pub fn press_start(&self) {
        self.lock().interaction_started = true;
    }

    /// Moves the active renderer's clock on by `secs` while playing.
    /// Returns the active renderer.
    pub fn advance(&self, secs: f64) -> Option<Uuid> {
        let mut state = self.lock();
        let active = state.active?;
        if state.playing {
            *state.positions.entry(active).or_insert(0.0) += secs;
        }
        Some(active)
    }

    /// Takes the link choices currently on screen, if any.
    pub fn take_link_choices(&self) -> Option<LinkChoicePresentation> {
        self.lock().link_choices.take()
    }

    fn lock(&self) -> MutexGuard<'_, PlayoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Player for SimulatedPlayer {
    fn queue_media(&self, renderer_id: Uuid, url: &str) {
        debug!(%renderer_id, url, "media queued");
        self.lock().positions.insert(renderer_id, 0.0);
    }

    fn unqueue_media(&self, renderer_id: Uuid) {
        self.lock().positions.remove(&renderer_id);
    }

    fn set_playout_active(&self, renderer_id: Uuid) {
        let mut state = self.lock();
        state.positions.entry(renderer_id).or_insert(0.0);
        state.active = Some(renderer_id);
    }

    fn set_playout_inactive(&self, renderer_id: Uuid) {
        let mut state = self.lock();
        // An ended renderer replays from the top if it is started again.
        state.positions.insert(renderer_id, 0.0);
        if state.active == Some(renderer_id) {
            state.active = None;
        }
    }

    fn play(&self) {
        self.lock().playing = true;
    }

    fn pause(&self) {
        self.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn has_started(&self) -> bool {
        self.lock().interaction_started
    }

    fn user_interaction_started(&self) -> bool {
        self.lock().interaction_started
    }

    fn current_time(&self, renderer_id: Uuid) -> Option<f64> {
        self.lock().positions.get(&renderer_id).copied()
    }

    fn duration(&self, _renderer_id: Uuid) -> Option<f64> {
        None
    }

    fn set_current_time(&self, renderer_id: Uuid, time: f64) {
        self.lock().positions.insert(renderer_id, time);
    }

    fn start_background(&self, key: &str, url: &str) {
        info!(key, url, "background audio playing");
    }

    fn stop_background(&self, key: &str) {
        info!(key, "background audio stopped");
    }

    fn fade_in_background(&self, key: &str, secs: f64) {
        debug!(key, secs, "background audio fading in");
    }

    fn fade_out_background(&self, key: &str, secs: f64) {
        info!(key, secs, "background audio fading out");
    }

    fn cancel_background_fade(&self, key: &str) {
        debug!(key, "background fade cancelled");
    }

    fn pause_background_fade(&self, key: &str) {
        debug!(key, "background fade paused");
    }

    fn resume_background_fade(&self, key: &str) {
        debug!(key, "background fade resumed");
    }

    fn pause_backgrounds(&self) {
        debug!("background audio paused");
    }

    fn play_backgrounds(&self) {
        debug!("background audio resumed");
    }

    fn enable_controls(&self) {}

    fn disable_controls(&self) {}

    fn set_back_available(&self, available: bool) {
        debug!(available, "back button availability");
    }

    fn set_next_available(&self, available: bool) {
        debug!(available, "next button availability");
    }

    fn show_seek_buttons(&self) {}

    fn hide_seek_buttons(&self) {}

    fn connect_scrub_bar(&self, _renderer_id: Uuid) {}

    fn disconnect_scrub_bar(&self, _renderer_id: Uuid) {}

    fn enter_complete_behaviour_phase(&self) {}

    fn exit_complete_behaviour_phase(&self) {}

    fn set_volume_control_level(&self, label: &str, value: f64) {
        debug!(label, value, "volume restored");
    }

    async fn present_behaviour(
        &self,
        renderer_id: Uuid,
        behaviour: &BehaviourDefinition,
        media_url: Option<String>,
    ) -> Result<(), PlayerError> {
        info!(
            %renderer_id,
            behaviour_id = %behaviour.id,
            behaviour_type = %behaviour.kind.urn(),
            media_url = media_url.as_deref().unwrap_or("none"),
            "behaviour presented"
        );
        Ok(())
    }

    fn clear_behaviour(&self, _renderer_id: Uuid, _behaviour_id: Uuid) -> Result<(), PlayerError> {
        Ok(())
    }

    fn clear_behaviour_elements(&self, _renderer_id: Uuid) -> Result<(), PlayerError> {
        Ok(())
    }

    fn show_link_choices(&self, renderer_id: Uuid, presentation: LinkChoicePresentation) {
        info!(
            %renderer_id,
            choices = presentation.choices.len(),
            "link choices shown"
        );
        self.lock().link_choices = Some(presentation);
    }

    fn clear_link_choices(&self) {
        self.lock().link_choices = None;
    }

    fn show_start_screen(&self, launch: &LaunchConfig, art_url: Option<String>) {
        info!(
            text = %launch.text,
            art_url = art_url.as_deref().unwrap_or("none"),
            "start screen shown"
        );
    }

    fn is_in_vr(&self) -> bool {
        false
    }

    fn exit_vr(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_moves_only_the_active_playing_renderer() {
        // Arrange
        let player = SimulatedPlayer::new();
        let (active, idle) = (Uuid::new_v4(), Uuid::new_v4());
        player.queue_media(idle, "media://idle.mp4");
        player.set_playout_active(active);

        // Act
        player.advance(1.5);
        player.pause();
        player.advance(1.0);

        // Assert
        assert_eq!(player.current_time(active), Some(1.5));
        assert_eq!(player.current_time(idle), Some(0.0));
    }

    #[test]
    fn test_inactive_renderer_rewinds() {
        // Arrange
        let player = SimulatedPlayer::new();
        let renderer = Uuid::new_v4();
        player.set_playout_active(renderer);
        player.advance(4.0);

        // Act
        player.set_playout_inactive(renderer);

        // Assert
        assert_eq!(player.current_time(renderer), Some(0.0));
        assert_eq!(player.advance(1.0), None);
    }
}
