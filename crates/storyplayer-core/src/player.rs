//! Player boundary: playout transport, controls and behaviour presentation.
//!
//! The render core calls into this boundary but never implements it. Every
//! renderer is addressed by its renderer id; background audio by its source
//! key.

use async_trait::async_trait;
use uuid::Uuid;

use crate::behaviour::BehaviourDefinition;
use crate::error::PlayerError;
use crate::model::LaunchConfig;

/// One link option handed to the player for display.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkChoiceIcon {
    /// Position among the choices.
    pub index: usize,
    /// Narrative element the choice leads to.
    pub target_narrative_element_id: Uuid,
    /// Resolved icon image URL, if any.
    pub icon_url: Option<String>,
    /// Icon text, if any.
    pub text: Option<String>,
}

/// How a set of link choices should be shown.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkChoicePresentation {
    /// Behaviour that owns the choices.
    pub behaviour_id: Uuid,
    /// Choices in display order.
    pub choices: Vec<LinkChoiceIcon>,
    /// Link highlighted initially; `None` when the user is forced to choose.
    pub default_target: Option<Uuid>,
    /// Animate a countdown.
    pub countdown: bool,
    /// Disable transport controls while shown.
    pub disable_controls: bool,
    /// Extra overlay style class.
    pub overlay_class: Option<String>,
}

/// Player and playout surface consumed by the render core.
#[async_trait]
pub trait Player: Send + Sync {
    // --- foreground playout ---

    /// Queues the renderer's media so it can start quickly.
    fn queue_media(&self, renderer_id: Uuid, url: &str);

    /// Releases the renderer's queued media.
    fn unqueue_media(&self, renderer_id: Uuid);

    /// Makes the renderer's playout the active one.
    fn set_playout_active(&self, renderer_id: Uuid);

    /// Deactivates the renderer's playout.
    fn set_playout_inactive(&self, renderer_id: Uuid);

    /// Resumes foreground playback.
    fn play(&self);

    /// Pauses foreground playback.
    fn pause(&self);

    /// Whether foreground playback is running.
    fn is_playing(&self) -> bool;

    /// Whether playback has ever started.
    fn has_started(&self) -> bool;

    /// Whether the user has interacted so media may play.
    fn user_interaction_started(&self) -> bool;

    /// Playback position of the renderer's media, in seconds.
    fn current_time(&self, renderer_id: Uuid) -> Option<f64>;

    /// Duration reported by the renderer's media, in seconds.
    fn duration(&self, renderer_id: Uuid) -> Option<f64>;

    /// Seeks the renderer's media.
    fn set_current_time(&self, renderer_id: Uuid, time: f64);

    // --- background playout ---

    /// Starts looping background audio from `url` under `key`.
    fn start_background(&self, key: &str, url: &str);

    /// Stops and releases background audio.
    fn stop_background(&self, key: &str);

    /// Fades background audio in over `secs`.
    fn fade_in_background(&self, key: &str, secs: f64);

    /// Fades background audio out over `secs`.
    fn fade_out_background(&self, key: &str, secs: f64);

    /// Cancels a running fade, restoring full volume.
    fn cancel_background_fade(&self, key: &str);

    /// Freezes a running fade.
    fn pause_background_fade(&self, key: &str);

    /// Continues a frozen fade.
    fn resume_background_fade(&self, key: &str);

    /// Pauses all background audio.
    fn pause_backgrounds(&self);

    /// Resumes all background audio.
    fn play_backgrounds(&self);

    // --- controls and indicators ---

    /// Enables transport controls.
    fn enable_controls(&self);

    /// Disables transport controls.
    fn disable_controls(&self);

    /// Shows or hides the back button.
    fn set_back_available(&self, available: bool);

    /// Shows or hides the next button.
    fn set_next_available(&self, available: bool);

    /// Shows the seek buttons.
    fn show_seek_buttons(&self);

    /// Hides the seek buttons.
    fn hide_seek_buttons(&self);

    /// Binds the scrub bar to the renderer.
    fn connect_scrub_bar(&self, renderer_id: Uuid);

    /// Unbinds the scrub bar.
    fn disconnect_scrub_bar(&self, renderer_id: Uuid);

    /// Signals that completion behaviours are running.
    fn enter_complete_behaviour_phase(&self);

    /// Signals that completion behaviours are done.
    fn exit_complete_behaviour_phase(&self);

    /// Restores a labelled volume control.
    fn set_volume_control_level(&self, label: &str, value: f64);

    // --- behaviours ---

    /// Presents a behaviour; resolves when its effect is finished (for
    /// example a variable panel being submitted).
    async fn present_behaviour(
        &self,
        renderer_id: Uuid,
        behaviour: &BehaviourDefinition,
        media_url: Option<String>,
    ) -> Result<(), PlayerError>;

    /// Removes one behaviour's elements.
    fn clear_behaviour(&self, renderer_id: Uuid, behaviour_id: Uuid) -> Result<(), PlayerError>;

    /// Removes every element owned by the renderer.
    fn clear_behaviour_elements(&self, renderer_id: Uuid) -> Result<(), PlayerError>;

    /// Displays link choices.
    fn show_link_choices(&self, renderer_id: Uuid, presentation: LinkChoicePresentation);

    /// Removes all link choices.
    fn clear_link_choices(&self);

    // --- misc ---

    /// Shows the story start screen.
    fn show_start_screen(&self, launch: &LaunchConfig, art_url: Option<String>);

    /// Whether the headset view is active.
    fn is_in_vr(&self) -> bool;

    /// Leaves the headset view.
    fn exit_vr(&self);
}
