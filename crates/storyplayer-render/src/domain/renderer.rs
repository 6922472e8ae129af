//! Renderer lifecycle for one representation.
//!
//! A renderer is built in `Constructing`, becomes `Constructed` once its
//! media is queued, runs in `Main`, runs completion behaviours in
//! `Completing`, and is torn down through `Ended` to `Destroyed`. All
//! player-facing side effects happen outside the state lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::join_all;
use storyplayer_core::analytics::{
    AnalyticsEventName, AnalyticsLogger, AnalyticsPayload, NOT_SET,
};
use storyplayer_core::behaviour::{BehaviourDefinition, BehaviourKind, LinkChoiceOptions};
use storyplayer_core::config::PlayerConfig;
use storyplayer_core::controller::Controller;
use storyplayer_core::error::PlayerError;
use storyplayer_core::fetchers::{Fetchers, MediaOptions};
use storyplayer_core::model::{Representation, RepresentationKind};
use storyplayer_core::player::{LinkChoiceIcon, LinkChoicePresentation, Player};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::behaviours::{BehaviourHandler, BehaviourPlan, ResolvedBehaviour};
use crate::domain::events::{RendererEvent, RendererMessage};
use crate::domain::phase::RendererPhase;
use crate::domain::timed_events::{TimedCallback, TimedEventService};

/// Listener id of the timed event that hides controls ahead of a choice.
pub const CONTROL_HIDE_LISTENER: &str = "prechoice-control-hide";

/// Collaborators shared by every renderer a manager builds.
#[derive(Clone)]
pub struct RendererContext {
    /// Story data access.
    pub fetchers: Arc<dyn Fetchers>,
    /// Playout and UI boundary.
    pub player: Arc<dyn Player>,
    /// Narrative graph owner.
    pub controller: Arc<dyn Controller>,
    /// Analytics sink.
    pub analytics: Arc<dyn AnalyticsLogger>,
    /// Tunable timings.
    pub config: PlayerConfig,
    /// Where renderers report their events.
    pub events: mpsc::UnboundedSender<RendererMessage>,
}

/// Snapshot of a renderer's playback position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTime {
    /// Position in seconds.
    pub current_time: f64,
    /// Seconds left; `None` when the duration is infinite.
    pub remaining_time: Option<f64>,
    /// Duration in seconds, possibly infinite.
    pub duration: f64,
    /// Whether the media can be seeked.
    pub time_based: bool,
}

/// Timing window of a registered timed event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEventWindow {
    /// Window start in seconds.
    pub start_time: f64,
    /// Window end in seconds.
    pub end_time: f64,
    /// Whether the start callback has fired without a clear.
    pub is_running: bool,
}

struct LinkChoiceState {
    behaviour_id: Uuid,
    options: LinkChoiceOptions,
    presented_targets: Option<Vec<Uuid>>,
    callback: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct RendererTasks {
    ticker: Option<JoinHandle<()>>,
    deferred_start: Option<JoinHandle<()>>,
    link_fade: Option<JoinHandle<()>>,
    behaviours: Vec<JoinHandle<()>>,
}

impl RendererTasks {
    fn abort_all(&mut self) {
        let handles = self
            .ticker
            .take()
            .into_iter()
            .chain(self.deferred_start.take())
            .chain(self.link_fade.take())
            .chain(self.behaviours.drain(..));
        for handle in handles {
            handle.abort();
        }
    }
}

struct RendererInner {
    phase: RendererPhase,
    constructed: bool,
    destroyed: bool,
    // Bumped by every end() so deferred work can tell it was superseded.
    epoch: u64,
    start_requested: bool,
    timed_events: TimedEventService,
    tasks: RendererTasks,
    link_choice: Option<LinkChoiceState>,
    in_pause: bool,
    in_variable_panel: bool,
    choice_index: usize,
    behaviour_media: HashMap<Uuid, String>,
}

/// Plays one representation of one narrative element.
pub struct Renderer {
    id: Uuid,
    narrative_element_id: Uuid,
    representation: Representation,
    plan: BehaviourPlan,
    built_in_vr: bool,
    ctx: RendererContext,
    pause_release: Notify,
    inner: Mutex<RendererInner>,
    this: Weak<Renderer>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("id", &self.id)
            .field("narrative_element_id", &self.narrative_element_id)
            .field("representation_id", &self.representation.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Builds a renderer and starts its asynchronous construction.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::UnknownRepresentationType` when the
    /// representation type has no renderer, and `PlayerError::InvalidState`
    /// for a switchable without choices.
    pub fn construct(
        narrative_element_id: Uuid,
        representation: Representation,
        ctx: RendererContext,
    ) -> Result<Arc<Self>, PlayerError> {
        match &representation.representation_type {
            RepresentationKind::Unknown(urn) => {
                return Err(PlayerError::UnknownRepresentationType(urn.clone()));
            }
            RepresentationKind::Switchable if representation.choices.is_empty() => {
                return Err(PlayerError::InvalidState(format!(
                    "switchable representation {} has no choices",
                    representation.id
                )));
            }
            _ => {}
        }

        let plan = BehaviourPlan::resolve(&representation.behaviours);
        let built_in_vr = ctx.player.is_in_vr();
        let renderer = Arc::new_cyclic(|this| Self {
            id: Uuid::new_v4(),
            narrative_element_id,
            representation,
            plan,
            built_in_vr,
            ctx,
            pause_release: Notify::new(),
            inner: Mutex::new(RendererInner {
                phase: RendererPhase::Constructing,
                constructed: false,
                destroyed: false,
                epoch: 0,
                start_requested: false,
                timed_events: TimedEventService::default(),
                tasks: RendererTasks::default(),
                link_choice: None,
                in_pause: false,
                in_variable_panel: false,
                choice_index: 0,
                behaviour_media: HashMap::new(),
            }),
            this: this.clone(),
        });

        debug!(
            renderer_id = %renderer.id,
            narrative_element_id = %narrative_element_id,
            representation_id = %renderer.representation.id,
            "constructing renderer"
        );

        let weak = Arc::downgrade(&renderer);
        tokio::spawn(async move {
            if let Some(renderer) = weak.upgrade() {
                renderer.init().await;
            }
        });

        Ok(renderer)
    }

    // --- identity and queries ---

    /// Playout key of this renderer instance.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Narrative element this renderer was built for.
    #[must_use]
    pub fn narrative_element_id(&self) -> Uuid {
        self.narrative_element_id
    }

    /// The representation as resolved.
    #[must_use]
    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    /// The representation currently showing. For a switchable this is the
    /// selected choice.
    #[must_use]
    pub fn active_representation(&self) -> &Representation {
        if self.representation.representation_type != RepresentationKind::Switchable {
            return &self.representation;
        }
        let index = self.lock().choice_index;
        self.representation
            .choices
            .get(index)
            .map_or(&self.representation, |choice| &choice.choice_representation)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> RendererPhase {
        self.lock().phase
    }

    /// Whether asynchronous construction has finished.
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.lock().constructed
    }

    /// Whether the media has finished playing.
    #[must_use]
    pub fn has_media_ended(&self) -> bool {
        self.phase().has_media_ended()
    }

    /// Whether a completion behaviour opens a variable panel.
    #[must_use]
    pub fn has_variable_panel_behaviour(&self) -> bool {
        self.plan
            .completed
            .iter()
            .any(|behaviour| behaviour.handler == BehaviourHandler::VariablePanel)
    }

    /// Whether any behaviour shows link choice icons.
    #[must_use]
    pub fn has_show_icon_behaviour(&self) -> bool {
        self.plan.contains_kind(&BehaviourKind::ShowLinkChoices)
    }

    /// Earliest time at which link choices appear.
    #[must_use]
    pub fn choice_time(&self) -> Option<f64> {
        self.plan.choice_time()
    }

    /// Whether the media is meant for VR viewing.
    #[must_use]
    pub fn is_vr_viewable(&self) -> bool {
        self.active_representation()
            .representation_type
            .is_vr_viewable()
    }

    /// Whether VR mode was on when this renderer was built.
    #[must_use]
    pub fn built_in_vr(&self) -> bool {
        self.built_in_vr
    }

    /// Whether a variable panel is open.
    #[must_use]
    pub fn in_variable_panel(&self) -> bool {
        self.lock().in_variable_panel
    }

    /// Whether a pause behaviour is holding.
    #[must_use]
    pub fn in_pause(&self) -> bool {
        self.lock().in_pause
    }

    /// Label of the selected switchable choice.
    #[must_use]
    pub fn choice_label(&self) -> Option<String> {
        let index = self.lock().choice_index;
        self.representation
            .choices
            .get(index)
            .map(|choice| choice.label.clone())
    }

    /// Playback position, remaining time and duration.
    #[must_use]
    pub fn current_time(&self) -> PlaybackTime {
        let representation = self.active_representation();
        let time_based = representation.representation_type.is_time_based();
        let current_time = self.ctx.player.current_time(self.id).unwrap_or(0.0);
        let duration = match representation.duration {
            Some(duration) if duration >= 0.0 => duration,
            _ => self
                .ctx
                .player
                .duration(self.id)
                .unwrap_or(f64::INFINITY),
        };
        let remaining_time = duration
            .is_finite()
            .then(|| (duration - current_time).max(0.0));
        PlaybackTime {
            current_time,
            remaining_time,
            duration,
            time_based,
        }
    }

    /// Window of a registered timed event.
    #[must_use]
    pub fn timed_event(&self, listener_id: &str) -> Option<TimedEventWindow> {
        self.lock()
            .timed_events
            .get(listener_id)
            .map(|event| TimedEventWindow {
                start_time: event.start_time,
                end_time: event.end_time,
                is_running: event.is_running(),
            })
    }

    // --- lifecycle ---

    /// Runs the "started" behaviours, then starts.
    pub fn will_start(&self) {
        if self.plan.started.is_empty() {
            self.start();
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let epoch = self.lock().epoch;
        let handle = tokio::spawn(async move {
            join_all(
                this.plan
                    .started
                    .iter()
                    .map(|behaviour| this.run_behaviour(behaviour)),
            )
            .await;
            let current = this.lock().epoch;
            if current == epoch {
                this.start();
            } else {
                debug!(renderer_id = %this.id, "renderer ended before started behaviours finished");
            }
        });
        self.track_task(handle);
    }

    /// Enters `Main`. Returns `false` when the call was deferred or had
    /// nothing to do.
    pub fn start(&self) -> bool {
        let (epoch, hide_controls_now) = {
            let mut inner = self.lock();
            if inner.destroyed {
                debug!(renderer_id = %self.id, "start on destroyed renderer ignored");
                return false;
            }
            if inner.phase.is_main() || inner.phase == RendererPhase::Completing {
                debug!(renderer_id = %self.id, phase = ?inner.phase, "renderer already started");
                return false;
            }
            if !inner.constructed {
                inner.start_requested = true;
                if inner.tasks.deferred_start.is_none() {
                    let epoch = inner.epoch;
                    inner.tasks.deferred_start = Some(self.spawn_deferred_start(epoch));
                }
                debug!(renderer_id = %self.id, "start requested during construction; deferring");
                return false;
            }
            inner.start_requested = false;
            inner.phase = RendererPhase::Main;
            let hide_now = self.register_during_behaviours(&mut inner);
            (inner.epoch, hide_now)
        };

        let player = &self.ctx.player;
        player.set_playout_active(self.id);
        player.connect_scrub_bar(self.id);
        if self.current_time().time_based {
            player.show_seek_buttons();
        } else {
            player.hide_seek_buttons();
        }
        if hide_controls_now {
            player.disable_controls();
        } else if player.user_interaction_started() {
            player.enable_controls();
        }

        self.service_timed_events();
        self.spawn_ticker(epoch);
        self.emit(RendererEvent::Started);
        info!(
            renderer_id = %self.id,
            narrative_element_id = %self.narrative_element_id,
            representation_id = %self.representation.id,
            "renderer started"
        );
        true
    }

    /// Marks the media as finished and moves on to completion.
    pub fn media_finished(&self) {
        {
            let mut inner = self.lock();
            if inner.phase != RendererPhase::Main {
                debug!(renderer_id = %self.id, phase = ?inner.phase, "media finished outside main phase");
                return;
            }
            inner.phase = RendererPhase::MediaFinished;
        }
        self.complete();
    }

    /// Enters `Completing` and runs the completion behaviours. An open
    /// forced link choice holds completion; picking a link navigates
    /// instead.
    pub fn complete(&self) {
        {
            let mut inner = self.lock();
            if inner.tasks.link_fade.is_some() {
                debug!(renderer_id = %self.id, "link fade pending; completion skipped");
                return;
            }
            if inner.destroyed || !inner.phase.is_main() {
                debug!(renderer_id = %self.id, phase = ?inner.phase, "complete ignored");
                return;
            }
            inner.phase = RendererPhase::Completing;
            let forced = inner
                .link_choice
                .as_ref()
                .is_some_and(|choice| choice.options.force_choice);
            if forced {
                debug!(renderer_id = %self.id, "waiting for a forced link choice before completing");
                return;
            }
        }
        self.run_completion();
    }

    fn run_completion(&self) {
        self.ctx.player.enter_complete_behaviour_phase();
        self.emit(RendererEvent::StartedCompleteBehaviours);
        self.ctx.analytics.log(AnalyticsPayload::renderer_action(
            AnalyticsEventName::CompleteBehaviourPhaseStarted,
        ));

        if self.plan.completed.is_empty() {
            self.emit(RendererEvent::Completed);
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let epoch = self.lock().epoch;
        let handle = tokio::spawn(async move {
            join_all(
                this.plan
                    .completed
                    .iter()
                    .map(|behaviour| this.run_behaviour(behaviour)),
            )
            .await;
            let current = this.lock().epoch;
            if current == epoch {
                this.emit(RendererEvent::Completed);
            }
        });
        self.track_task(handle);
    }

    /// Tears down playback. Returns `false` when already ended.
    pub fn end(&self) -> bool {
        let was_started = {
            let mut inner = self.lock();
            if inner.phase.is_ended() {
                debug!(renderer_id = %self.id, phase = ?inner.phase, "end on ended renderer ignored");
                return false;
            }
            let was_started = inner.phase.is_main() || inner.phase == RendererPhase::Completing;
            inner.phase = RendererPhase::Ended;
            inner.epoch += 1;
            inner.start_requested = false;
            inner.in_pause = false;
            inner.in_variable_panel = false;
            inner.link_choice = None;
            inner.tasks.abort_all();
            was_started
        };
        self.pause_release.notify_waiters();

        // A renderer that never reached MAIN owns no player state.
        if was_started {
            let player = &self.ctx.player;
            player.disconnect_scrub_bar(self.id);
            if let Err(error) = player.clear_behaviour_elements(self.id) {
                warn!(renderer_id = %self.id, %error, "could not clear behaviour elements");
            }
            player.set_playout_inactive(self.id);
            player.exit_complete_behaviour_phase();
            self.reapply_link_conditions();
        }
        debug!(renderer_id = %self.id, "renderer ended");
        true
    }

    /// Ends if needed, then releases everything. Returns `false` when
    /// already destroyed.
    pub fn destroy(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.destroyed {
                debug!(renderer_id = %self.id, "destroy on destroyed renderer ignored");
                return false;
            }
            inner.destroyed = true;
        }
        self.end();
        {
            let mut inner = self.lock();
            inner.phase = RendererPhase::Destroyed;
            inner.timed_events.clear();
            inner.behaviour_media.clear();
            inner.tasks.abort_all();
        }
        self.ctx.player.unqueue_media(self.id);
        self.emit(RendererEvent::Destroyed);
        debug!(renderer_id = %self.id, "renderer destroyed");
        true
    }

    // --- timed events ---

    /// Registers a timed event against this renderer's playback position.
    pub fn add_time_event(
        &self,
        listener_id: impl Into<String>,
        start_time: f64,
        start_callback: TimedCallback,
        end_time: Option<f64>,
        clear_callback: Option<TimedCallback>,
    ) {
        self.lock().timed_events.add(
            listener_id,
            start_time,
            start_callback,
            end_time,
            clear_callback,
        );
    }

    /// Removes a timed event. Returns `false` when none was registered.
    pub fn remove_time_event(&self, listener_id: &str) -> bool {
        self.lock().timed_events.remove(listener_id)
    }

    /// One poll of the timed event service. Does nothing until the user has
    /// interacted with the player.
    pub fn service_timed_events(&self) {
        if !self.ctx.player.user_interaction_started() {
            return;
        }
        let position = self.current_time().current_time;
        let due = {
            let mut inner = self.lock();
            if inner.destroyed {
                return;
            }
            inner.timed_events.due(position)
        };
        for invocation in due {
            invocation.invoke(self.id);
        }
    }

    // --- user operations ---

    /// Seeks to an absolute position. Returns `false` for media that cannot
    /// be seeked.
    pub fn set_current_time(&self, time: f64) -> bool {
        if !self.current_time().time_based {
            debug!(renderer_id = %self.id, "media is not seekable");
            return false;
        }
        self.ctx.player.set_current_time(self.id, time);
        self.service_timed_events();
        true
    }

    /// Skips forward by the configured step.
    pub fn seek_forward(&self) {
        self.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::SeekForwardButtonClicked,
            None,
            None,
        ));
        if self.phase() == RendererPhase::Completing {
            self.exit_complete_pause();
            return;
        }
        let time = self.current_time();
        if !time.time_based {
            return;
        }
        let mut target = time.current_time + self.ctx.config.seek_secs;
        if let Some(choice_time) = self.choice_time() {
            if time.current_time < choice_time && target > choice_time {
                target = choice_time;
            }
        }
        if time.duration.is_finite() {
            target = target.min(time.duration);
        }
        self.set_current_time(target);
    }

    /// Skips back by the configured step.
    pub fn seek_back(&self) {
        self.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::SeekBackwardButtonClicked,
            None,
            None,
        ));
        if self.phase() == RendererPhase::Completing {
            return;
        }
        let time = self.current_time();
        if !time.time_based {
            return;
        }
        self.set_current_time((time.current_time - self.ctx.config.seek_secs).max(0.0));
    }

    /// Plays or pauses the foreground media.
    pub fn set_playing(&self, playing: bool) {
        let name = if playing {
            self.ctx.player.play();
            AnalyticsEventName::VideoUnpause
        } else {
            self.ctx.player.pause();
            AnalyticsEventName::VideoPause
        };
        self.ctx
            .analytics
            .log(AnalyticsPayload::renderer_action(name));
        let was_in_pause = std::mem::replace(&mut self.lock().in_pause, false);
        if was_in_pause {
            self.pause_release.notify_waiters();
        }
    }

    /// Releases a pause behaviour holding during completion.
    pub fn exit_complete_pause(&self) {
        if self.phase() == RendererPhase::Completing {
            self.pause_release.notify_waiters();
        }
    }

    /// Reports a press of the next button to the owner.
    pub fn next_button_clicked(&self) {
        self.emit(RendererEvent::NextButtonClicked);
    }

    /// Reports a press of the back button to the owner.
    pub fn previous_button_clicked(&self) {
        self.emit(RendererEvent::PreviousButtonClicked);
    }

    // --- switchable ---

    /// Switches to the choice at `index` and reports it. Returns `false`
    /// when there is no such choice or it is already selected.
    pub fn switch_to_index(&self, index: usize) -> bool {
        let Some(choice) = self.representation.choices.get(index) else {
            return false;
        };
        {
            let mut inner = self.lock();
            if inner.choice_index == index {
                return false;
            }
            inner.choice_index = index;
        }
        info!(renderer_id = %self.id, label = %choice.label, "switched representation");
        self.emit(RendererEvent::SwitchedRepresentation {
            label: choice.label.clone(),
            representation: Box::new(choice.choice_representation.clone()),
        });
        true
    }

    /// Switches to the choice with `label` and reports it.
    pub fn switch_to_label(&self, label: &str) -> bool {
        self.index_of_label(label)
            .is_some_and(|index| self.switch_to_index(index))
    }

    /// Selects the choice with `label` without reporting it, so that a
    /// renderer built later picks up the label chosen earlier.
    pub fn set_choice_to_label(&self, label: &str) -> bool {
        let Some(index) = self.index_of_label(label) else {
            return false;
        };
        self.lock().choice_index = index;
        true
    }

    fn index_of_label(&self, label: &str) -> Option<usize> {
        self.representation
            .choices
            .iter()
            .position(|choice| choice.label == label)
    }

    // --- link choices ---

    /// Handles the user picking a link choice.
    pub fn follow_link(&self, target: Uuid) {
        let player = &self.ctx.player;
        if !player.is_playing() {
            player.play();
        }
        let options = {
            let mut inner = self.lock();
            let Some(state) = inner.link_choice.as_mut() else {
                debug!(renderer_id = %self.id, "link chosen with no choices showing");
                return;
            };
            state.options.force_choice = false;
            state.options.clone()
        };
        self.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::LinkChoiceClicked,
            Some(self.narrative_element_id.to_string()),
            Some(target.to_string()),
        ));

        if !options.show_ne_to_end {
            self.hide_choice_icons(Some(target));
            return;
        }
        if let Some(element) = self.ctx.controller.current_narrative_element() {
            self.ctx.controller.set_link_override(element.id, Some(target));
        }
        if self.has_media_ended() {
            self.hide_choice_icons(Some(target));
        } else if options.one_shot {
            self.hide_choice_icons(None);
            self.ctx.controller.refresh_player_controls();
            player.enable_controls();
            player.show_seek_buttons();
        }
    }

    /// Re-presents link choices after a story variable changed.
    pub async fn handle_variable_changed(&self) {
        let showing = self.lock().link_choice.is_some();
        if showing {
            self.render_link_choices().await;
        }
    }

    async fn apply_link_choices(&self, definition: &BehaviourDefinition) -> Result<(), PlayerError> {
        let (sender, receiver) = oneshot::channel();
        self.lock().link_choice = Some(LinkChoiceState {
            behaviour_id: definition.id,
            options: definition.link_choice_options(),
            presented_targets: None,
            callback: Some(sender),
        });
        self.render_link_choices().await;
        // A dropped sender means the renderer ended; either way we are done.
        let _ = receiver.await;
        Ok(())
    }

    async fn render_link_choices(&self) {
        let Some((behaviour_id, options)) = self
            .lock()
            .link_choice
            .as_ref()
            .map(|state| (state.behaviour_id, state.options.clone()))
        else {
            return;
        };
        let player = &self.ctx.player;
        if options.disable_controls {
            player.disable_controls();
        }

        let steps = match self.ctx.controller.valid_next_steps().await {
            Ok(steps) => steps,
            Err(error) => {
                error!(renderer_id = %self.id, %error, "could not get valid next steps");
                self.fire_link_callback();
                return;
            }
        };
        let targets: Vec<Uuid> = steps
            .iter()
            .map(|step| step.target_narrative_element_id)
            .collect();

        {
            let mut inner = self.lock();
            let Some(state) = inner.link_choice.as_mut() else {
                return;
            };
            match &state.presented_targets {
                Some(previous) if *previous == targets => {
                    debug!(renderer_id = %self.id, "same link options valid; nothing to refresh");
                    return;
                }
                Some(_) => player.clear_link_choices(),
                None => {}
            }
            state.presented_targets = Some(targets.clone());
        }

        if targets.is_empty() || (targets.len() == 1 && !options.show_if_one_link) {
            // Choices that are never shown cannot hold up completion.
            if let Some(state) = self.lock().link_choice.as_mut() {
                state.options.force_choice = false;
            }
        }
        if targets.is_empty() {
            warn!(renderer_id = %self.id, "link choice behaviour with no valid links");
            player.enable_controls();
            self.fire_link_callback();
            return;
        }
        if targets.len() == 1 && !options.show_if_one_link {
            debug!(renderer_id = %self.id, "single valid link; choices not shown");
            player.enable_controls();
            self.fire_link_callback();
            return;
        }

        let default_target = if options.force_choice {
            None
        } else {
            self.ctx
                .controller
                .current_narrative_element()
                .and_then(|element| {
                    element
                        .link_targets()
                        .find(|target| targets.contains(target))
                })
        };
        let choices = join_all(targets.iter().enumerate().map(|(index, target)| {
            self.link_choice_icon(index, *target, &options)
        }))
        .await;

        player.show_link_choices(
            self.id,
            LinkChoicePresentation {
                behaviour_id,
                choices,
                default_target,
                countdown: options.countdown,
                disable_controls: options.disable_controls,
                overlay_class: options.icon_overlay_class.clone(),
            },
        );
        if !options.force_choice {
            self.fire_link_callback();
        }
    }

    async fn link_choice_icon(
        &self,
        index: usize,
        target: Uuid,
        options: &LinkChoiceOptions,
    ) -> LinkChoiceIcon {
        let icon = options
            .link_icons
            .iter()
            .find(|icon| icon.target_narrative_element_id == target);
        let mut icon_url = None;
        if let Some(asset_id) = icon
            .and_then(|icon| icon.image)
            .and_then(|mapping| self.representation.resolve_behaviour_asset(mapping))
        {
            match self.image_url(asset_id).await {
                Ok(url) => icon_url = Some(url),
                Err(error) => {
                    warn!(renderer_id = %self.id, %error, "could not resolve link icon image");
                }
            }
        }
        LinkChoiceIcon {
            index,
            target_narrative_element_id: target,
            icon_url,
            text: icon.and_then(|icon| icon.text.clone()),
        }
    }

    fn hide_choice_icons(&self, target: Option<Uuid>) {
        if target.is_some() {
            self.reapply_link_conditions();
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let fade = self.ctx.config.link_fade;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(fade).await;
            this.ctx.player.clear_link_choices();
            this.lock().tasks.link_fade = None;
            if let Some(target) = target {
                this.ctx.controller.follow_link(target);
            } else {
                this.fire_link_callback();
            }
        });
        let mut inner = self.lock();
        if let Some(previous) = inner.tasks.link_fade.replace(handle) {
            previous.abort();
        }
    }

    fn fire_link_callback(&self) {
        let sender = self
            .lock()
            .link_choice
            .as_mut()
            .and_then(|state| state.callback.take());
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    fn reapply_link_conditions(&self) {
        if let Some(element) = self.ctx.controller.current_narrative_element() {
            self.ctx.controller.set_link_override(element.id, None);
        }
    }

    // --- behaviours ---

    async fn run_behaviour(&self, behaviour: &ResolvedBehaviour) {
        let definition = &behaviour.definition;
        let result = match behaviour.handler {
            BehaviourHandler::Present => {
                self.ctx
                    .player
                    .present_behaviour(self.id, definition, None)
                    .await
            }
            BehaviourHandler::ShowImage => self.present_image(definition).await,
            BehaviourHandler::VariablePanel => self.present_variable_panel(definition).await,
            BehaviourHandler::LinkChoices => self.apply_link_choices(definition).await,
            BehaviourHandler::Pause => {
                self.hold_pause(definition.pause_secs()).await;
                Ok(())
            }
            BehaviourHandler::ManipulateVariable => self.manipulate_variables(definition).await,
        };
        if let Err(error) = result {
            warn!(
                renderer_id = %self.id,
                behaviour_id = %definition.id,
                %error,
                "behaviour failed"
            );
        }
    }

    async fn present_image(&self, definition: &BehaviourDefinition) -> Result<(), PlayerError> {
        let asset_id = definition
            .image_mapping_id()
            .and_then(|mapping| self.representation.resolve_behaviour_asset(mapping))
            .ok_or_else(|| {
                PlayerError::Behaviour(format!("no image asset mapped for behaviour {}", definition.id))
            })?;
        let url = self.image_url(asset_id).await?;
        self.ctx
            .player
            .present_behaviour(self.id, definition, Some(url))
            .await
    }

    async fn present_variable_panel(
        &self,
        definition: &BehaviourDefinition,
    ) -> Result<(), PlayerError> {
        self.lock().in_variable_panel = true;
        let result = self
            .ctx
            .player
            .present_behaviour(self.id, definition, None)
            .await;
        self.lock().in_variable_panel = false;
        result
    }

    async fn hold_pause(&self, secs: Option<f64>) {
        self.lock().in_pause = true;
        let released = self.pause_release.notified();
        match secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok()) {
            Some(wait) => {
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = released => {}
                }
            }
            None => released.await,
        }
        self.lock().in_pause = false;
    }

    async fn manipulate_variables(&self, definition: &BehaviourDefinition) -> Result<(), PlayerError> {
        for assignment in definition.variable_assignments() {
            debug!(renderer_id = %self.id, variable = %assignment.variable, "setting variable");
            self.ctx
                .controller
                .set_variable_value(&assignment.variable, assignment.value)
                .await?;
        }
        Ok(())
    }

    fn run_during_behaviour(&self, index: usize) {
        let Some(during) = self.plan.during.get(index) else {
            return;
        };
        let Some(this) = self.this.upgrade() else {
            return;
        };
        info!(
            renderer_id = %self.id,
            behaviour_id = %during.behaviour.definition.id,
            "during behaviour started"
        );
        self.ctx.analytics.log(
            AnalyticsPayload::renderer_action(AnalyticsEventName::DuringBehaviourStarted)
                .between(during.behaviour.definition.kind.urn(), NOT_SET),
        );
        let handle = tokio::spawn(async move {
            if let Some(during) = this.plan.during.get(index) {
                this.run_behaviour(&during.behaviour).await;
            }
        });
        self.track_task(handle);
    }

    fn clear_during_behaviour(&self, behaviour_id: Uuid) -> Result<(), PlayerError> {
        let was_link_choice = {
            let mut inner = self.lock();
            let matches = inner
                .link_choice
                .as_ref()
                .is_some_and(|state| state.behaviour_id == behaviour_id);
            if matches {
                inner.link_choice = None;
            }
            matches
        };
        if was_link_choice {
            self.ctx.player.clear_link_choices();
            self.ctx.player.enable_controls();
        }
        self.ctx.player.clear_behaviour(self.id, behaviour_id)
    }

    /// Queues every during behaviour as a timed event. Returns `true` when
    /// controls must be hidden straight away.
    fn register_during_behaviours(&self, inner: &mut RendererInner) -> bool {
        let mut hide_now = false;
        for (index, during) in self.plan.during.iter().enumerate() {
            let behaviour_id = during.behaviour.definition.id;
            let weak = self.this.clone();
            let start: TimedCallback = Arc::new(move || {
                if let Some(renderer) = weak.upgrade() {
                    renderer.run_during_behaviour(index);
                }
                Ok(())
            });
            let weak = self.this.clone();
            let clear: TimedCallback = Arc::new(move || match weak.upgrade() {
                Some(renderer) => renderer.clear_during_behaviour(behaviour_id),
                None => Ok(()),
            });
            inner.timed_events.add(
                behaviour_id.to_string(),
                during.start_time,
                start,
                Some(during.end_time),
                Some(clear),
            );

            let hides_controls = during.behaviour.handler == BehaviourHandler::LinkChoices
                && during.behaviour.definition.link_choice_options().disable_controls;
            if hides_controls {
                if during.start_time > 1.0 {
                    let player = Arc::clone(&self.ctx.player);
                    inner.timed_events.add(
                        CONTROL_HIDE_LISTENER,
                        during.start_time - self.ctx.config.control_hide_lead_secs,
                        Arc::new(move || {
                            player.disable_controls();
                            Ok(())
                        }),
                        None,
                        None,
                    );
                } else {
                    hide_now = true;
                }
            }
        }
        hide_now
    }

    // --- construction ---

    async fn init(&self) {
        self.preload_behaviour_assets().await;
        if let Err(error) = self.queue_foreground_media().await {
            error!(renderer_id = %self.id, %error, "could not queue renderer media");
        }

        let advanced = {
            let mut inner = self.lock();
            if inner.destroyed {
                debug!(renderer_id = %self.id, "construction finished after destroy; skipping setup");
                return;
            }
            inner.constructed = true;
            if inner.phase == RendererPhase::Constructing {
                inner.phase = RendererPhase::Constructed;
                true
            } else {
                false
            }
        };
        debug!(renderer_id = %self.id, advanced, "renderer constructed");
        self.emit(RendererEvent::Constructed);
    }

    async fn preload_behaviour_assets(&self) {
        let fetches = self
            .representation
            .asset_collections
            .behaviours
            .iter()
            .map(|mapping| self.image_url(mapping.asset_collection_id));
        for result in join_all(fetches).await {
            if let Err(error) = result {
                warn!(renderer_id = %self.id, %error, "could not preload behaviour asset");
            }
        }
    }

    async fn queue_foreground_media(&self) -> Result<(), PlayerError> {
        let representation = self.active_representation();
        let Some(foreground_id) = representation.asset_collections.foreground_id else {
            return Ok(());
        };
        let kind = &representation.representation_type;
        if !kind.is_time_based() && *kind != RepresentationKind::Image {
            return Ok(());
        }
        let assets = self.ctx.fetchers.asset_collection(foreground_id).await?.assets;
        let src = match kind {
            RepresentationKind::Audio => assets.audio_src,
            RepresentationKind::Image => assets.image_src,
            _ => assets.av_src,
        }
        .ok_or_else(|| {
            PlayerError::Fetch(format!("asset collection {foreground_id} has no media source"))
        })?;
        let url = self.ctx.fetchers.media(&src, MediaOptions::default()).await?;
        if self.lock().destroyed {
            return Ok(());
        }
        self.ctx.player.queue_media(self.id, &url);
        Ok(())
    }

    async fn image_url(&self, asset_collection_id: Uuid) -> Result<String, PlayerError> {
        if let Some(url) = self.lock().behaviour_media.get(&asset_collection_id) {
            return Ok(url.clone());
        }
        let collection = self
            .ctx
            .fetchers
            .asset_collection(asset_collection_id)
            .await?;
        let src = collection.assets.image_src.ok_or_else(|| {
            PlayerError::Fetch(format!("asset collection {asset_collection_id} has no image"))
        })?;
        let url = self
            .ctx
            .fetchers
            .media(
                &src,
                MediaOptions {
                    include_credentials: true,
                },
            )
            .await?;
        self.lock()
            .behaviour_media
            .insert(asset_collection_id, url.clone());
        Ok(url)
    }

    // --- plumbing ---

    fn spawn_deferred_start(&self, epoch: u64) -> JoinHandle<()> {
        let weak = self.this.clone();
        let retry = self.ctx.config.start_retry;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(retry).await;
                let Some(renderer) = weak.upgrade() else {
                    return;
                };
                let ready = {
                    let mut inner = renderer.lock();
                    if inner.destroyed || inner.epoch != epoch || !inner.start_requested {
                        inner.tasks.deferred_start = None;
                        return;
                    }
                    if inner.constructed {
                        inner.tasks.deferred_start = None;
                    }
                    inner.constructed
                };
                if ready {
                    renderer.start();
                    return;
                }
            }
        })
    }

    fn spawn_ticker(&self, epoch: u64) {
        let weak = self.this.clone();
        let period = self.ctx.config.timer_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(renderer) = weak.upgrade() else {
                    break;
                };
                renderer.service_timed_events();
            }
        });
        let mut inner = self.lock();
        if inner.destroyed || inner.epoch != epoch {
            handle.abort();
        } else if let Some(previous) = inner.tasks.ticker.replace(handle) {
            previous.abort();
        }
    }

    fn track_task(&self, handle: JoinHandle<()>) {
        let mut inner = self.lock();
        if inner.destroyed {
            handle.abort();
            return;
        }
        inner.tasks.behaviours.retain(|task| !task.is_finished());
        inner.tasks.behaviours.push(handle);
    }

    fn emit(&self, event: RendererEvent) {
        let message = RendererMessage {
            renderer_id: self.id,
            event,
        };
        if self.ctx.events.send(message).is_err() {
            debug!(renderer_id = %self.id, "renderer event receiver closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, RendererInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storyplayer_core::behaviour::DuringBehaviour;
    use storyplayer_core::model::AssetCollection;
    use storyplayer_test_support::{PlayerCall, StoryFixture, behaviour, media_collection, video};

    use super::*;

    fn context(fixture: &StoryFixture) -> (RendererContext, mpsc::UnboundedReceiver<RendererMessage>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let ctx = RendererContext {
            fetchers: fixture.fetchers.clone(),
            player: fixture.player.clone(),
            controller: fixture.controller.clone(),
            analytics: fixture.analytics.clone(),
            config: PlayerConfig::default(),
            events,
        };
        (ctx, receiver)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn with_foreground(fixture: &StoryFixture, mut representation: Representation) -> (Representation, AssetCollection) {
        let collection = media_collection("clip.mp4");
        fixture.fetchers.add_asset_collection(collection.clone());
        representation.asset_collections.foreground_id = Some(collection.id);
        (representation, collection)
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<RendererMessage>) -> Vec<RendererEvent> {
        let mut events = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            events.push(message.event);
        }
        events
    }

    #[tokio::test]
    async fn test_construct_rejects_unknown_representation_type() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let representation = storyplayer_test_support::representation(
            RepresentationKind::Unknown("urn:example:hologram".to_owned()),
            None,
        );

        // Act
        let result = Renderer::construct(Uuid::new_v4(), representation, ctx);

        // Assert
        assert!(matches!(result, Err(PlayerError::UnknownRepresentationType(_))));
    }

    #[tokio::test]
    async fn test_construction_queues_media_and_reports_constructed() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, mut events) = context(&fixture);
        let (representation, _) = with_foreground(&fixture, video(30.0));

        // Act
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;

        // Assert
        assert_eq!(renderer.phase(), RendererPhase::Constructed);
        assert!(fixture.player.calls().contains(&PlayerCall::QueueMedia {
            renderer_id: renderer.id(),
            url: "https://media.test/clip.mp4".to_owned(),
        }));
        assert_eq!(drain(&mut events), vec![RendererEvent::Constructed]);
    }

    #[tokio::test]
    async fn test_destroy_during_construction_skips_remaining_setup() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let (representation, collection) = with_foreground(&fixture, video(30.0));
        let gate = fixture.fetchers.hold(collection.id);
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;

        // Act
        let destroyed = renderer.destroy();
        gate.release();
        settle().await;

        // Assert
        assert!(destroyed);
        assert_eq!(renderer.phase(), RendererPhase::Destroyed);
        assert!(!renderer.is_constructed());
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::QueueMedia { .. })),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_during_construction_is_deferred() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let (representation, collection) = with_foreground(&fixture, video(30.0));
        let gate = fixture.fetchers.hold(collection.id);
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();

        // Act
        let started_now = renderer.start();
        gate.release();
        tokio::time::sleep(Duration::from_millis(250)).await;

        // Assert
        assert!(!started_now);
        assert_eq!(renderer.phase(), RendererPhase::Main);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_start_abandoned_by_end_never_reaches_main() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let (representation, collection) = with_foreground(&fixture, video(30.0));
        let gate = fixture.fetchers.hold(collection.id);
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        renderer.start();

        // Act
        renderer.end();
        gate.release();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert_eq!(renderer.phase(), RendererPhase::Ended);
        assert!(renderer.is_constructed());
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::SetPlayoutActive(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_end_on_ended_renderer_is_a_silent_no_op() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let renderer = Renderer::construct(Uuid::new_v4(), video(30.0), ctx).unwrap();
        settle().await;
        renderer.start();
        assert!(renderer.end());
        fixture.player.clear_calls();

        // Act
        let second = renderer.end();

        // Assert
        assert!(!second);
        assert!(fixture.player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_twice_tears_down_once() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, mut events) = context(&fixture);
        let renderer = Renderer::construct(Uuid::new_v4(), video(30.0), ctx).unwrap();
        settle().await;
        renderer.start();

        // Act
        let first = renderer.destroy();
        let second = renderer.destroy();

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(renderer.phase(), RendererPhase::Destroyed);
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::UnqueueMedia(_))),
            1
        );
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::SetPlayoutInactive(_))),
            1
        );
        let destroyed = drain(&mut events)
            .into_iter()
            .filter(|event| *event == RendererEvent::Destroyed)
            .count();
        assert_eq!(destroyed, 1);
    }

    #[tokio::test]
    async fn test_ending_an_unstarted_renderer_leaves_player_alone() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let renderer = Renderer::construct(Uuid::new_v4(), video(30.0), ctx).unwrap();
        settle().await;

        // Act
        renderer.end();

        // Assert
        assert!(fixture.controller.overrides().is_empty());
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::SetPlayoutInactive(_))),
            0
        );
    }

    #[tokio::test]
    async fn test_restart_from_ended_re_enters_main() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let renderer = Renderer::construct(Uuid::new_v4(), video(30.0), ctx).unwrap();
        settle().await;
        renderer.start();
        renderer.end();

        // Act
        let restarted = renderer.start();

        // Assert
        assert!(restarted);
        assert_eq!(renderer.phase(), RendererPhase::Main);
    }

    #[tokio::test]
    async fn test_during_behaviour_follows_its_window() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let overlay = behaviour(BehaviourKind::TextOverlay, json!({ "text": "hello" }));
        let overlay_id = overlay.id;
        let mut representation = video(30.0);
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 5.0,
            duration: Some(5.0),
            behaviour: overlay,
        });
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();

        // Act
        fixture.player.set_position(renderer.id(), 6.0);
        renderer.service_timed_events();
        settle().await;
        fixture.player.set_position(renderer.id(), 12.0);
        renderer.service_timed_events();

        // Assert
        let presented = fixture.player.count(|call| {
            matches!(call, PlayerCall::PresentBehaviour { behaviour_id, .. } if *behaviour_id == overlay_id)
        });
        let cleared = fixture.player.count(|call| {
            matches!(call, PlayerCall::ClearBehaviour { behaviour_id, .. } if *behaviour_id == overlay_id)
        });
        assert_eq!(presented, 1);
        assert_eq!(cleared, 1);
    }

    #[tokio::test]
    async fn test_ticks_before_user_interaction_fire_nothing() {
        // Arrange
        let fixture = StoryFixture::new();
        fixture.player.set_user_interaction_started(false);
        let (ctx, _events) = context(&fixture);
        let overlay = behaviour(BehaviourKind::ColourOverlay, json!({ "colour": "#000" }));
        let mut representation = video(30.0);
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 0.0,
            duration: None,
            behaviour: overlay.clone(),
        });
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();

        // Act
        renderer.service_timed_events();
        settle().await;

        // Assert
        assert!(!renderer.timed_event(&overlay.id.to_string()).unwrap().is_running);
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::PresentBehaviour { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_failing_clear_does_not_stop_later_events() {
        // Arrange
        let fixture = StoryFixture::new();
        fixture.player.fail_behaviour_clears();
        let (ctx, _events) = context(&fixture);
        let early = behaviour(BehaviourKind::TextOverlay, json!({}));
        let late = behaviour(BehaviourKind::TextOverlay, json!({}));
        let late_id = late.id;
        let mut representation = video(30.0);
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 0.0,
            duration: Some(2.0),
            behaviour: early,
        });
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 3.0,
            duration: None,
            behaviour: late,
        });
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();
        settle().await;

        // Act
        fixture.player.set_position(renderer.id(), 4.0);
        renderer.service_timed_events();
        settle().await;

        // Assert
        let late_presented = fixture.player.count(|call| {
            matches!(call, PlayerCall::PresentBehaviour { behaviour_id, .. } if *behaviour_id == late_id)
        });
        assert_eq!(late_presented, 1);
    }

    #[tokio::test]
    async fn test_unknown_behaviour_skipped_while_siblings_run() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, mut events) = context(&fixture);
        let known = behaviour(
            BehaviourKind::ManipulateVariable,
            json!({ "variables": [{ "variable_name": "seen_intro", "value": true }] }),
        );
        let mut representation = video(30.0);
        representation.behaviours.completed = vec![
            behaviour(BehaviourKind::Unknown("urn:example:confetti".to_owned()), json!({})),
            known,
        ];
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();

        // Act
        renderer.media_finished();
        settle().await;

        // Assert
        assert_eq!(fixture.controller.variable("seen_intro"), Some(json!(true)));
        assert!(drain(&mut events).contains(&RendererEvent::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_pause_holds_until_elapsed() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, mut events) = context(&fixture);
        let mut representation = video(30.0);
        representation.behaviours.completed =
            vec![behaviour(BehaviourKind::Pause, json!({ "pause": 3 }))];
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();
        drain(&mut events);

        // Act
        renderer.media_finished();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let early = drain(&mut events);
        tokio::time::sleep(Duration::from_secs(3)).await;
        let late = drain(&mut events);

        // Assert
        assert_eq!(early, vec![RendererEvent::StartedCompleteBehaviours]);
        assert_eq!(late, vec![RendererEvent::Completed]);
        assert_eq!(renderer.phase(), RendererPhase::Completing);
    }

    #[tokio::test]
    async fn test_seek_forward_stops_at_choice_time() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let mut representation = video(60.0);
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 15.0,
            duration: None,
            behaviour: behaviour(BehaviourKind::ShowLinkChoices, json!({})),
        });
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();
        fixture.player.set_position(renderer.id(), 8.0);

        // Act
        renderer.seek_forward();

        // Assert
        assert!((renderer.current_time().current_time - 15.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_seek_back_clamps_at_start() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let renderer = Renderer::construct(Uuid::new_v4(), video(60.0), ctx).unwrap();
        settle().await;
        renderer.start();
        fixture.player.set_position(renderer.id(), 4.0);

        // Act
        renderer.seek_back();

        // Assert
        assert!(renderer.current_time().current_time.abs() < f64::EPSILON);
        assert!(
            fixture
                .analytics
                .names()
                .contains(&AnalyticsEventName::SeekBackwardButtonClicked)
        );
    }

    #[tokio::test]
    async fn test_non_time_based_media_is_not_seeked() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, _events) = context(&fixture);
        let representation =
            storyplayer_test_support::representation(RepresentationKind::Text, None);
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        renderer.start();

        // Act
        renderer.seek_forward();
        let accepted = renderer.set_current_time(5.0);

        // Assert
        assert!(!accepted);
        assert!(!renderer.current_time().time_based);
        assert_eq!(
            fixture
                .player
                .count(|call| matches!(call, PlayerCall::SetCurrentTime { .. })),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_link_without_show_to_end_follows_after_fade() {
        // Arrange
        let fixture = StoryFixture::new();
        let left = Uuid::new_v4();
        let right = Uuid::new_v4();
        fixture.add_element(left, video(10.0), &[]);
        fixture.add_element(right, video(10.0), &[]);
        let current = fixture.add_element(Uuid::new_v4(), video(30.0), &[left, right]);
        fixture.controller.set_current(current.id);
        let (ctx, _events) = context(&fixture);
        let mut representation = video(30.0);
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 0.0,
            duration: None,
            behaviour: behaviour(
                BehaviourKind::ShowLinkChoices,
                json!({ "show_ne_to_end": false }),
            ),
        });
        let renderer = Renderer::construct(current.id, representation, ctx).unwrap();
        settle().await;
        renderer.start();
        settle().await;

        // Act
        renderer.follow_link(right);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Assert
        assert_eq!(fixture.controller.followed_links(), vec![right]);
        let shown = fixture.player.calls().into_iter().find_map(|call| match call {
            PlayerCall::ShowLinkChoices { presentation, .. } => Some(presentation),
            _ => None,
        });
        let shown = shown.unwrap();
        assert_eq!(shown.choices.len(), 2);
        assert_eq!(shown.default_target, Some(left));
    }

    /// A started renderer for an element linking to two others, showing link
    /// choices from the first second with `params`.
    async fn choosing(
        fixture: &StoryFixture,
        params: serde_json::Value,
    ) -> (Arc<Renderer>, mpsc::UnboundedReceiver<RendererMessage>, Uuid, Uuid) {
        let (left, right) = (Uuid::new_v4(), Uuid::new_v4());
        fixture.add_element(left, video(10.0), &[]);
        fixture.add_element(right, video(10.0), &[]);
        let current = fixture.add_element(Uuid::new_v4(), video(30.0), &[left, right]);
        fixture.controller.set_current(current.id);
        let (ctx, events) = context(fixture);
        let mut representation = video(30.0);
        representation.behaviours.during.push(DuringBehaviour {
            start_time: 0.0,
            duration: None,
            behaviour: behaviour(BehaviourKind::ShowLinkChoices, params),
        });
        let renderer = Renderer::construct(current.id, representation, ctx).unwrap();
        settle().await;
        renderer.start();
        settle().await;
        (renderer, events, left, right)
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_choice_holds_completion_until_a_link_is_picked() {
        // Arrange
        let fixture = StoryFixture::new();
        let (renderer, mut events, _left, right) =
            choosing(&fixture, json!({ "force_choice": true })).await;
        drain(&mut events);

        // Act
        renderer.media_finished();
        settle().await;
        let held = drain(&mut events);
        renderer.follow_link(right);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Assert
        assert_eq!(renderer.phase(), RendererPhase::Completing);
        assert!(held.is_empty());
        let shown = fixture.player.calls().into_iter().find_map(|call| match call {
            PlayerCall::ShowLinkChoices { presentation, .. } => Some(presentation),
            _ => None,
        });
        assert_eq!(shown.unwrap().default_target, None);
        assert_eq!(fixture.controller.followed_links(), vec![right]);
        assert!(!drain(&mut events).contains(&RendererEvent::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_choice_hides_icons_and_keeps_playing() {
        // Arrange
        let fixture = StoryFixture::new();
        let (renderer, _events, _left, right) =
            choosing(&fixture, json!({ "one_shot": true })).await;
        let element_id = renderer.narrative_element_id();

        // Act
        renderer.follow_link(right);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Assert
        assert_eq!(renderer.phase(), RendererPhase::Main);
        assert_eq!(fixture.controller.overrides(), vec![(element_id, Some(right))]);
        assert!(fixture.controller.followed_links().is_empty());
        assert_eq!(fixture.controller.control_refreshes(), 1);
        let calls = fixture.player.calls();
        assert!(calls.contains(&PlayerCall::ShowSeekButtons));
        assert!(calls.contains(&PlayerCall::ClearLinkChoices));
    }

    #[tokio::test]
    async fn test_switchable_adopts_label_and_reports_switches() {
        // Arrange
        let fixture = StoryFixture::new();
        let (ctx, mut events) = context(&fixture);
        let mut representation =
            storyplayer_test_support::representation(RepresentationKind::Switchable, None);
        for label in ["wide", "close"] {
            representation
                .choices
                .push(storyplayer_core::model::RepresentationChoice {
                    label: label.to_owned(),
                    choice_representation: video(30.0),
                });
        }
        let renderer = Renderer::construct(Uuid::new_v4(), representation, ctx).unwrap();
        settle().await;
        drain(&mut events);

        // Act
        let silent = renderer.set_choice_to_label("close");
        let silent_events = drain(&mut events);
        let switched = renderer.switch_to_label("wide");

        // Assert
        assert!(silent);
        assert!(silent_events.is_empty());
        assert!(switched);
        assert_eq!(renderer.choice_label().as_deref(), Some("wide"));
        assert!(matches!(
            drain(&mut events).as_slice(),
            [RendererEvent::SwitchedRepresentation { label, .. }] if label == "wide"
        ));
    }
}
