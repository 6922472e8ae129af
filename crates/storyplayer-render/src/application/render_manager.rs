//! Render manager: keeps exactly one current renderer and orchestrates
//! transitions, lookahead and background audio.
//!
//! A transition resolves the new element's representation, swaps (or
//! restarts) the current renderer, then reconciles the lookahead cache and
//! the background audio. Transitions may overlap; each one carries a
//! generation number and drops its results once a newer transition has
//! begun. The state `Mutex` is never held across an `.await`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::join_all;
use storyplayer_core::analytics::{
    AnalyticsEventName, AnalyticsEventType, AnalyticsLogger, AnalyticsPayload, NOT_SET,
};
use storyplayer_core::config::PlayerConfig;
use storyplayer_core::controller::{Controller, ControllerEvent};
use storyplayer_core::error::PlayerError;
use storyplayer_core::fetchers::{Fetchers, MediaOptions, RepresentationReasoner};
use storyplayer_core::model::{LaunchConfig, NarrativeElement, Representation};
use storyplayer_core::player::Player;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::application::crossfade::{BackgroundRegistry, CrossfadeScheduler};
use crate::application::lookahead::{CacheDecision, LookaheadCache, decide, required_ids};
use crate::application::session_state::SessionState;
use crate::domain::events::{RenderManagerEvent, RendererEvent, RendererMessage};
use crate::domain::phase::RendererPhase;
use crate::domain::renderer::{Renderer, RendererContext};

/// Lead before the end that the next button skips to on a variable-panel
/// renderer.
const VARIABLE_PANEL_SKIP_LEAD_SECS: f64 = 0.25;

/// External collaborators the render manager drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Narrative graph owner.
    pub controller: Arc<dyn Controller>,
    /// Picks a representation from a collection.
    pub reasoner: Arc<dyn RepresentationReasoner>,
    /// Story data access.
    pub fetchers: Arc<dyn Fetchers>,
    /// Playout and UI boundary.
    pub player: Arc<dyn Player>,
    /// Analytics sink.
    pub analytics: Arc<dyn AnalyticsLogger>,
}

/// How a narrative element change was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// A different renderer became current.
    Swapped,
    /// The current renderer was restarted in place.
    Restarted,
    /// A newer change superseded this one; nothing was applied.
    Stale,
    /// The representation has no renderer; the previous one stays.
    Skipped,
}

struct Current {
    element: NarrativeElement,
    renderer: Arc<Renderer>,
}

#[derive(Default)]
struct ManagerState {
    current: Option<Current>,
    generation: u64,
    cache: LookaheadCache,
    backgrounds: BackgroundRegistry,
    session: SessionState,
    resume_on_visible: bool,
}

struct Shared {
    ctx: RendererContext,
    reasoner: Arc<dyn RepresentationReasoner>,
    crossfade: CrossfadeScheduler,
    outbound: mpsc::UnboundedSender<RenderManagerEvent>,
    state: Mutex<ManagerState>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().ok().and_then(Option::take) {
            pump.abort();
        }
    }
}

/// Orchestrates renderers for a story session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RenderManager {
    shared: Arc<Shared>,
}

impl RenderManager {
    /// Creates a manager and the receiver for its outbound events. Must be
    /// called inside a tokio runtime.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        config: PlayerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RenderManagerEvent>) {
        let (renderer_events, renderer_receiver) = mpsc::unbounded_channel();
        let (outbound, receiver) = mpsc::unbounded_channel();
        let crossfade = CrossfadeScheduler::new(
            Arc::clone(&collaborators.fetchers),
            Arc::clone(&collaborators.player),
            config.fade_out_secs,
        );
        let shared = Arc::new(Shared {
            ctx: RendererContext {
                fetchers: collaborators.fetchers,
                player: collaborators.player,
                controller: collaborators.controller,
                analytics: collaborators.analytics,
                config,
                events: renderer_events,
            },
            reasoner: collaborators.reasoner,
            crossfade,
            outbound,
            state: Mutex::new(ManagerState::default()),
            pump: Mutex::new(None),
        });
        let pump = tokio::spawn(pump_renderer_events(
            Arc::downgrade(&shared),
            renderer_receiver,
        ));
        *shared.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
        (Self { shared }, receiver)
    }

    // --- queries ---

    /// The current renderer.
    #[must_use]
    pub fn current_renderer(&self) -> Option<Arc<Renderer>> {
        self.lock()
            .current
            .as_ref()
            .map(|current| Arc::clone(&current.renderer))
    }

    /// The element the current renderer plays.
    #[must_use]
    pub fn current_narrative_element(&self) -> Option<NarrativeElement> {
        self.lock()
            .current
            .as_ref()
            .map(|current| current.element.clone())
    }

    /// Element ids held by the lookahead cache.
    #[must_use]
    pub fn cached_element_ids(&self) -> Vec<Uuid> {
        self.lock().cache.keys()
    }

    /// Renderer cached for an element.
    #[must_use]
    pub fn cached_renderer(&self, narrative_element_id: Uuid) -> Option<Arc<Renderer>> {
        self.lock().cache.get(narrative_element_id).cloned()
    }

    /// Keys of playing background sources.
    #[must_use]
    pub fn active_background_keys(&self) -> Vec<String> {
        self.lock().backgrounds.active_keys()
    }

    /// Keys of prepared background sources.
    #[must_use]
    pub fn pending_background_keys(&self) -> Vec<String> {
        self.lock().backgrounds.pending_keys()
    }

    /// A copy of the session state.
    #[must_use]
    pub fn session(&self) -> SessionState {
        self.lock().session.clone()
    }

    // --- controller events ---

    /// Consumes controller notifications until the channel closes. Element
    /// changes run as their own tasks so a newer change can overtake an
    /// older one still fetching; each takes its generation in arrival order,
    /// before it is spawned.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ControllerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ControllerEvent::NarrativeElementChanged(element) => {
                    let generation = self.next_generation();
                    let manager = self.clone();
                    tokio::spawn(async move {
                        // Failures are logged where they happen.
                        let _ = manager.transition(element, generation).await;
                    });
                }
                event @ ControllerEvent::VariableChanged { .. } => {
                    self.handle_controller_event(event).await;
                }
            }
        }
        debug!("controller event channel closed");
    }

    /// Handles one controller notification to completion.
    pub async fn handle_controller_event(&self, event: ControllerEvent) {
        match event {
            ControllerEvent::NarrativeElementChanged(element) => {
                // Failures are logged where they happen.
                let _ = self.on_narrative_element_changed(element).await;
            }
            ControllerEvent::VariableChanged { name } => {
                debug!(variable = %name, "story variable changed");
                if let Some(renderer) = self.current_renderer() {
                    renderer.handle_variable_changed().await;
                }
                self.refresh_onward_icons().await;
            }
        }
    }

    /// Makes `element` current: restarts the current renderer if nothing
    /// changed, otherwise swaps in a renderer for it, then reconciles
    /// lookahead and background audio.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::MissingRepresentationCollection` when the
    /// element has no representation collection, or the fetcher/reasoner
    /// error when resolution fails. The previous renderer stays current.
    pub async fn on_narrative_element_changed(
        &self,
        element: NarrativeElement,
    ) -> Result<TransitionOutcome, PlayerError> {
        let generation = self.next_generation();
        self.transition(element, generation).await
    }

    /// Starts a transition; any transition begun earlier becomes stale.
    fn next_generation(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.generation
    }

    #[instrument(skip(self, element), fields(narrative_element_id = %element.id))]
    async fn transition(
        &self,
        element: NarrativeElement,
        generation: u64,
    ) -> Result<TransitionOutcome, PlayerError> {
        if self.is_stale(generation) {
            debug!("superseded before it started; discarding");
            return Ok(TransitionOutcome::Stale);
        }
        self.shared.ctx.player.clear_link_choices();

        let representation = match self.resolve_representation(&element).await {
            Ok(representation) => representation,
            Err(error) => {
                error!(%error, "could not resolve representation; staying on current renderer");
                return Err(error);
            }
        };
        if self.is_stale(generation) {
            debug!("representation resolved for a superseded change; discarding");
            return Ok(TransitionOutcome::Stale);
        }

        let restart = self.lock().current.as_ref().and_then(|current| {
            (current.element.id == element.id
                && current.renderer.representation().id == representation.id)
                .then(|| Arc::clone(&current.renderer))
        });
        if let Some(renderer) = restart {
            info!(renderer_id = %renderer.id(), "same representation; restarting in place");
            renderer.end();
            renderer.will_start();
            self.show_back_icon().await;
            self.refresh_onward_icons().await;
            self.apply_current_backgrounds(renderer.active_representation(), generation)
                .await;
            self.run_lookahead(&element, generation).await;
            return Ok(TransitionOutcome::Restarted);
        }

        let Some(renderer) = self.obtain_renderer(&element, representation)? else {
            return Ok(TransitionOutcome::Skipped);
        };
        if !self.swap_renderers(&element, &renderer, generation) {
            debug!("renderer obtained for a superseded change; discarding");
            self.discard_unswapped(&renderer);
            return Ok(TransitionOutcome::Stale);
        }

        self.show_back_icon().await;
        self.refresh_onward_icons().await;
        self.apply_current_backgrounds(renderer.active_representation(), generation)
            .await;
        self.run_lookahead(&element, generation).await;
        Ok(TransitionOutcome::Swapped)
    }

    async fn resolve_representation(
        &self,
        element: &NarrativeElement,
    ) -> Result<Representation, PlayerError> {
        let collection_id = element
            .body
            .representation_collection_target_id
            .ok_or(PlayerError::MissingRepresentationCollection(element.id))?;
        let collection = self
            .shared
            .ctx
            .fetchers
            .representation_collection(collection_id)
            .await?;
        self.shared.reasoner.choose(&collection).await
    }

    /// Reuses a fitting cached renderer or builds a new one. `Ok(None)` when
    /// the representation type has no renderer.
    fn obtain_renderer(
        &self,
        element: &NarrativeElement,
        representation: Representation,
    ) -> Result<Option<Arc<Renderer>>, PlayerError> {
        let state = self.lock();
        let in_vr = self.shared.ctx.player.is_in_vr();
        let cached = state.cache.get(element.id);
        if decide(cached, representation.id, in_vr) == CacheDecision::Keep {
            if let Some(cached) = cached.filter(|cached| cached.phase() != RendererPhase::Destroyed) {
                debug!(renderer_id = %cached.id(), "reusing renderer from lookahead");
                return Ok(Some(Arc::clone(cached)));
            }
        }
        drop(state);
        match Renderer::construct(element.id, representation, self.shared.ctx.clone()) {
            Ok(renderer) => Ok(Some(renderer)),
            Err(PlayerError::UnknownRepresentationType(urn)) => {
                warn!(representation_type = %urn, "no renderer for representation type; skipping");
                Ok(None)
            }
            Err(error) => {
                error!(%error, "could not build renderer");
                Err(error)
            }
        }
    }

    /// Tears down a renderer that never became current, unless lookahead
    /// holds it.
    fn discard_unswapped(&self, renderer: &Arc<Renderer>) {
        let cached = self.lock().cache.holds(renderer);
        if !cached {
            renderer.destroy();
        }
    }

    /// Makes `renderer` current. Returns `false` if a newer change has
    /// begun.
    fn swap_renderers(
        &self,
        element: &NarrativeElement,
        renderer: &Arc<Renderer>,
        generation: u64,
    ) -> bool {
        let (previous, previous_cached, label) = {
            let mut state = self.lock();
            if state.generation != generation {
                return false;
            }
            let previous = state.current.replace(Current {
                element: element.clone(),
                renderer: Arc::clone(renderer),
            });
            let previous_cached = previous
                .as_ref()
                .is_some_and(|previous| state.cache.holds(&previous.renderer));
            let label = state
                .session
                .last_switchable_label()
                .map(str::to_owned);
            (previous, previous_cached, label)
        };

        let player = &self.shared.ctx.player;
        let from = previous
            .as_ref()
            .map_or_else(|| NOT_SET.to_owned(), |previous| previous.element.id.to_string());
        if let Some(previous) = previous {
            if previous.renderer.is_vr_viewable() && !renderer.is_vr_viewable() {
                player.exit_vr();
            }
            if previous_cached {
                previous.renderer.end();
            } else {
                previous.renderer.destroy();
            }
        }

        self.shared.ctx.analytics.log(
            AnalyticsPayload::new(
                AnalyticsEventType::StoryNavigation,
                AnalyticsEventName::NarrativeElementChange,
            )
            .between(from, element.id.to_string()),
        );
        if let Some(label) = label {
            renderer.set_choice_to_label(&label);
        }
        renderer.will_start();
        self.reapply_volumes();
        info!(
            renderer_id = %renderer.id(),
            representation_id = %renderer.representation().id,
            "renderer swapped in"
        );
        self.send(RenderManagerEvent::NarrativeElementRendered {
            narrative_element_id: element.id,
            representation_id: renderer.representation().id,
        });
        true
    }

    // --- lookahead ---

    /// Re-runs lookahead for the current element.
    pub async fn refresh_lookahead(&self) {
        let snapshot = {
            let state = self.lock();
            state
                .current
                .as_ref()
                .map(|current| (current.element.clone(), state.generation))
        };
        if let Some((element, generation)) = snapshot {
            self.run_lookahead(&element, generation).await;
        }
    }

    async fn run_lookahead(&self, element: &NarrativeElement, generation: u64) {
        let controller = &self.shared.ctx.controller;
        let (previous, next) = futures::join!(
            controller.id_of_previous_node(),
            controller.ids_of_next_nodes(element)
        );
        let previous = previous.unwrap_or_else(|error| {
            warn!(%error, "could not get previous element for lookahead");
            None
        });
        let next = match next {
            Ok(next) => next,
            Err(error) => {
                warn!(%error, "could not get next elements for lookahead");
                return;
            }
        };
        let required = required_ids(previous, &next);

        let resolved = join_all(
            required
                .iter()
                .filter(|id| **id != element.id)
                .map(|id| self.resolve_neighbour(*id)),
        )
        .await;

        let mut retired = Vec::new();
        {
            let mut state = self.lock();
            if state.generation != generation {
                debug!("lookahead finished for a superseded change; discarding");
                return;
            }
            let Some(current) = state
                .current
                .as_ref()
                .map(|current| Arc::clone(&current.renderer))
            else {
                return;
            };
            let in_vr = self.shared.ctx.player.is_in_vr();
            let label = state
                .session
                .last_switchable_label()
                .map(str::to_owned);

            if required.contains(&element.id) {
                if let Some(displaced) = state.cache.insert(element.id, Arc::clone(&current)) {
                    if !Arc::ptr_eq(&displaced, &current) {
                        retired.push(displaced);
                    }
                }
            }

            for (id, representation) in resolved.into_iter().flatten() {
                let decision = decide(state.cache.get(id), representation.id, in_vr);
                if decision == CacheDecision::Keep {
                    continue;
                }
                match Renderer::construct(id, representation, self.shared.ctx.clone()) {
                    Ok(renderer) => {
                        if let Some(label) = &label {
                            renderer.set_choice_to_label(label);
                        }
                        if let Some(displaced) = state.cache.insert(id, renderer) {
                            if !Arc::ptr_eq(&displaced, &current) {
                                retired.push(displaced);
                            }
                        }
                    }
                    Err(error) => {
                        warn!(narrative_element_id = %id, %error, "could not build lookahead renderer");
                        if decision == CacheDecision::Rebuild {
                            if let Some(stale) = state.cache.remove(id) {
                                if !Arc::ptr_eq(&stale, &current) {
                                    retired.push(stale);
                                }
                            }
                        }
                    }
                }
            }

            for id in state.cache.keys() {
                if required.contains(&id) {
                    continue;
                }
                // The current renderer may sit in the cache under its own
                // id; evicting it must not tear it down.
                if let Some(evicted) = state.cache.remove(id) {
                    if !Arc::ptr_eq(&evicted, &current) {
                        retired.push(evicted);
                    }
                }
            }
            debug!(cached = ?state.cache.keys(), "lookahead reconciled");
        }
        for renderer in retired {
            renderer.destroy();
        }

        self.run_background_lookahead(previous, generation).await;
    }

    async fn resolve_neighbour(&self, id: Uuid) -> Option<(Uuid, Representation)> {
        let Some(element) = self.shared.ctx.controller.narrative_element(id) else {
            warn!(narrative_element_id = %id, "lookahead element not found");
            return None;
        };
        match self.resolve_representation(&element).await {
            Ok(representation) => Some((id, representation)),
            Err(error) => {
                warn!(narrative_element_id = %id, %error, "could not resolve lookahead representation");
                None
            }
        }
    }

    // --- background audio ---

    async fn apply_current_backgrounds(&self, representation: &Representation, generation: u64) {
        let sources = self
            .shared
            .crossfade
            .resolve_sources(representation.background_ids())
            .await;
        let changes = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!("backgrounds resolved for a superseded change; discarding");
                return;
            }
            self.shared
                .crossfade
                .reconcile_active(&mut state.backgrounds, &sources)
        };
        for stopped in changes.stopped {
            stopped.destroy();
        }
        for kept in changes.kept {
            kept.cancel_fade();
        }
        join_all(changes.started.iter().map(|started| started.start())).await;
    }

    async fn run_background_lookahead(&self, previous: Option<Uuid>, generation: u64) {
        let (all_ids, forward_ids) = {
            let state = self.lock();
            let mut all_ids: Vec<Uuid> = Vec::new();
            let mut forward_ids: BTreeSet<Uuid> = BTreeSet::new();
            if let Some(current) = &state.current {
                all_ids.extend(current.renderer.active_representation().background_ids());
            }
            for (id, renderer) in state.cache.iter() {
                let backgrounds = renderer.active_representation().background_ids();
                all_ids.extend(backgrounds);
                if Some(id) != previous {
                    forward_ids.extend(backgrounds);
                }
            }
            all_ids.sort_unstable();
            all_ids.dedup();
            (all_ids, forward_ids)
        };

        let sources = self.shared.crossfade.resolve_sources(&all_ids).await;
        let forward_keys: BTreeSet<String> = sources
            .iter()
            .filter(|source| forward_ids.contains(&source.collection.id))
            .map(|source| source.key.clone())
            .collect();

        let (dropped, active, current) = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!("background lookahead finished for a superseded change; discarding");
                return;
            }
            let Some(current) = state
                .current
                .as_ref()
                .map(|current| Arc::clone(&current.renderer))
            else {
                return;
            };
            let dropped = self
                .shared
                .crossfade
                .reconcile_pending(&mut state.backgrounds, &sources);
            (dropped, state.backgrounds.active(), current)
        };
        for renderer in dropped {
            renderer.destroy();
        }
        self.shared
            .crossfade
            .apply_fades(&active, &current, &forward_keys);
    }

    // --- renderer events ---

    async fn handle_renderer_message(&self, message: RendererMessage) {
        let current = self
            .current_renderer()
            .filter(|renderer| renderer.id() == message.renderer_id);
        let Some(current) = current else {
            debug!(
                renderer_id = %message.renderer_id,
                event = ?message.event,
                "ignoring event from a renderer that is not current"
            );
            return;
        };
        match message.event {
            RendererEvent::Completed => self.send(RenderManagerEvent::Completed {
                narrative_element_id: current.narrative_element_id(),
            }),
            RendererEvent::NextButtonClicked => self.send(RenderManagerEvent::NextButtonClicked),
            RendererEvent::PreviousButtonClicked => {
                self.send(RenderManagerEvent::PreviousButtonClicked);
            }
            RendererEvent::SwitchedRepresentation {
                label,
                representation,
            } => self.handle_switched(&label, &representation).await,
            event @ (RendererEvent::Constructed
            | RendererEvent::Started
            | RendererEvent::StartedCompleteBehaviours
            | RendererEvent::Destroyed) => {
                debug!(renderer_id = %current.id(), ?event, "renderer event");
            }
        }
    }

    async fn handle_switched(&self, label: &str, representation: &Representation) {
        let (previous_label, cached, generation) = {
            let mut state = self.lock();
            let previous = state.session.set_switchable_label(label);
            let cached: Vec<Arc<Renderer>> = state
                .cache
                .iter()
                .map(|(_, renderer)| Arc::clone(renderer))
                .collect();
            (previous, cached, state.generation)
        };
        self.shared.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::SwitchableRepresentationSwitch,
            previous_label,
            Some(label.to_owned()),
        ));
        for renderer in cached {
            renderer.set_choice_to_label(label);
        }
        self.apply_current_backgrounds(representation, generation)
            .await;
        self.reapply_volumes();
    }

    // --- indicators ---

    async fn show_back_icon(&self) {
        match self.shared.ctx.controller.id_of_previous_node().await {
            Ok(previous) => self.shared.ctx.player.set_back_available(previous.is_some()),
            Err(error) => {
                warn!(%error, "could not get previous element");
                self.shared.ctx.player.set_back_available(false);
            }
        }
    }

    async fn refresh_onward_icons(&self) {
        let player = &self.shared.ctx.player;
        let Some(renderer) = self.current_renderer() else {
            player.set_next_available(false);
            return;
        };
        if renderer.in_variable_panel() {
            player.set_next_available(false);
            return;
        }
        match self.shared.ctx.controller.valid_next_steps().await {
            Ok(steps) => {
                let available = !steps.is_empty()
                    && (steps.len() == 1 || !renderer.has_show_icon_behaviour());
                player.set_next_available(available);
            }
            Err(error) => {
                warn!(%error, "could not get valid next steps");
                player.set_next_available(false);
            }
        }
    }

    // --- player-facing handlers ---

    /// Next button: skips a variable panel renderer to just before its end,
    /// otherwise asks to move forward.
    pub fn handle_next_button(&self) {
        self.shared.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::NextButtonClicked,
            None,
            None,
        ));
        let Some(renderer) = self.current_renderer() else {
            return;
        };
        if renderer.has_variable_panel_behaviour() && !renderer.has_media_ended() {
            let time = renderer.current_time();
            if time.time_based && time.duration.is_finite() {
                renderer.set_current_time((time.duration - VARIABLE_PANEL_SKIP_LEAD_SECS).max(0.0));
            } else {
                renderer.complete();
            }
            return;
        }
        renderer.next_button_clicked();
    }

    /// Back button: asks to move back.
    pub fn handle_back_button(&self) {
        self.shared.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::BackButtonClicked,
            None,
            None,
        ));
        if let Some(renderer) = self.current_renderer() {
            renderer.previous_button_clicked();
        }
    }

    /// Volume slider moved; remembered for the rest of the session.
    pub fn handle_volume_changed(&self, label: &str, value: f64) {
        let stored = {
            let mut state = self.lock();
            state.session.set_volume(label, value);
            state.session.volume(label).unwrap_or(value)
        };
        self.shared
            .ctx
            .player
            .set_volume_control_level(label, stored);
        self.shared.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::VolumeChanged,
            Some(label.to_owned()),
            Some(stored.to_string()),
        ));
    }

    /// Play/pause pressed.
    pub fn handle_play_pause(&self, playing: bool) {
        self.shared.ctx.analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::PlayPauseButtonClicked,
            None,
            Some(if playing { "play" } else { "pause" }.to_owned()),
        ));
        if let Some(renderer) = self.current_renderer() {
            renderer.set_playing(playing);
        }
        let active = self.lock().backgrounds.active();
        self.shared.crossfade.set_playing(&active, playing);
    }

    /// The page was hidden or shown again.
    pub fn handle_visibility_change(&self, visible: bool) {
        let (from, to) = if visible {
            ("hidden", "visible")
        } else {
            ("visible", "hidden")
        };
        self.shared.ctx.analytics.log(
            AnalyticsPayload::new(
                AnalyticsEventType::UserAction,
                AnalyticsEventName::BrowserVisibilityChange,
            )
            .between(from, to),
        );
        if visible {
            let resume = std::mem::take(&mut self.lock().resume_on_visible);
            if resume {
                self.handle_play_pause(true);
            }
        } else {
            let playing = self.shared.ctx.player.is_playing();
            self.lock().resume_on_visible = playing;
            if playing {
                self.handle_play_pause(false);
            }
        }
    }

    /// The user picked a link choice.
    pub fn handle_link_chosen(&self, target: Uuid) {
        if let Some(renderer) = self.current_renderer() {
            renderer.follow_link(target);
        }
    }

    /// VR mode was toggled; rebuilds cached renderers built for the other
    /// mode.
    pub async fn handle_vr_toggled(&self) {
        info!(in_vr = self.shared.ctx.player.is_in_vr(), "vr mode toggled");
        self.refresh_lookahead().await;
    }

    /// Shows the start screen, with launch art when it resolves.
    #[instrument(skip(self))]
    pub async fn handle_story_start(&self, story_id: Uuid) {
        let fetchers = &self.shared.ctx.fetchers;
        let launch = match fetchers.story(story_id).await {
            Ok(story) => story.meta.on_launch.unwrap_or_default(),
            Err(error) => {
                warn!(%error, "could not fetch story for start screen");
                LaunchConfig::default()
            }
        };
        let art = match launch.background_art_asset_collection_id {
            Some(id) => match self.launch_art(id).await {
                Ok(url) => Some(url),
                Err(error) => {
                    warn!(%error, "could not resolve launch art");
                    None
                }
            },
            None => None,
        };
        self.shared.ctx.player.show_start_screen(&launch, art);
    }

    async fn launch_art(&self, asset_collection_id: Uuid) -> Result<String, PlayerError> {
        let fetchers = &self.shared.ctx.fetchers;
        let collection = fetchers.asset_collection(asset_collection_id).await?;
        let src = collection.assets.image_src.ok_or_else(|| {
            PlayerError::Fetch(format!("asset collection {asset_collection_id} has no image"))
        })?;
        fetchers.media(&src, MediaOptions::default()).await
    }

    /// Tears down every renderer and forgets the session's renderers.
    pub fn reset(&self) {
        let (current, cached, backgrounds) = {
            let mut state = self.lock();
            state.generation += 1;
            (
                state.current.take(),
                state.cache.drain(),
                state.backgrounds.drain(),
            )
        };
        if let Some(current) = current {
            current.renderer.destroy();
        }
        for renderer in cached {
            renderer.destroy();
        }
        for background in backgrounds {
            background.destroy();
        }
        self.shared.ctx.player.clear_link_choices();
        info!("render manager reset");
    }

    // --- plumbing ---

    fn reapply_volumes(&self) {
        let volumes: Vec<(String, f64)> = self
            .lock()
            .session
            .volumes()
            .map(|(label, value)| (label.to_owned(), value))
            .collect();
        for (label, value) in volumes {
            self.shared
                .ctx
                .player
                .set_volume_control_level(&label, value);
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.lock().generation != generation
    }

    fn send(&self, event: RenderManagerEvent) {
        if self.shared.outbound.send(event).is_err() {
            debug!("render manager event receiver closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn pump_renderer_events(
    shared: Weak<Shared>,
    mut receiver: mpsc::UnboundedReceiver<RendererMessage>,
) {
    while let Some(message) = receiver.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        RenderManager { shared }
            .handle_renderer_message(message)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use storyplayer_core::analytics::AnalyticsEventName;
    use storyplayer_core::model::{Story, StoryMeta};
    use storyplayer_test_support::{PlayerCall, StoryFixture, media_collection, video};

    use super::*;

    fn manager(fixture: &StoryFixture) -> (RenderManager, mpsc::UnboundedReceiver<RenderManagerEvent>) {
        RenderManager::new(
            Collaborators {
                controller: fixture.controller.clone(),
                reasoner: fixture.reasoner.clone(),
                fetchers: fixture.fetchers.clone(),
                player: fixture.player.clone(),
                analytics: fixture.analytics.clone(),
            },
            PlayerConfig::default(),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    /// A single element with one outbound link, made current.
    async fn started(fixture: &StoryFixture) -> (RenderManager, mpsc::UnboundedReceiver<RenderManagerEvent>, NarrativeElement) {
        let next = Uuid::new_v4();
        fixture.add_element(next, video(10.0), &[]);
        let element = fixture.add_element(Uuid::new_v4(), video(30.0), &[next]);
        fixture.controller.set_current(element.id);
        let (manager, events) = manager(fixture);
        manager
            .on_narrative_element_changed(element.clone())
            .await
            .unwrap();
        settle().await;
        (manager, events, element)
    }

    #[tokio::test(start_paused = true)]
    async fn test_element_without_collection_is_rejected() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events) = manager(&fixture);
        let mut element = fixture.add_element(Uuid::new_v4(), video(5.0), &[]);
        element.body.representation_collection_target_id = None;

        // Act
        let result = manager.on_narrative_element_changed(element.clone()).await;

        // Assert
        assert!(matches!(
            result,
            Err(PlayerError::MissingRepresentationCollection(id)) if id == element.id
        ));
        assert!(manager.current_renderer().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_updates_indicators_and_logs_navigation() {
        // Arrange
        let fixture = StoryFixture::new();

        // Act
        let (manager, mut events, element) = started(&fixture).await;

        // Assert
        let calls = fixture.player.calls();
        assert!(calls.contains(&PlayerCall::SetBackAvailable(false)));
        assert!(calls.contains(&PlayerCall::SetNextAvailable(true)));
        let navigation = fixture
            .analytics
            .payloads()
            .into_iter()
            .find(|payload| payload.name == AnalyticsEventName::NarrativeElementChange)
            .unwrap();
        assert_eq!(navigation.from.as_deref(), Some(NOT_SET));
        assert_eq!(navigation.to, Some(element.id.to_string()));
        let renderer = manager.current_renderer().unwrap();
        assert_eq!(
            events.try_recv().unwrap(),
            RenderManagerEvent::NarrativeElementRendered {
                narrative_element_id: element.id,
                representation_id: renderer.representation().id,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_renderer_buttons_are_forwarded_from_current_renderer_only() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, mut events, element) = started(&fixture).await;
        while events.try_recv().is_ok() {}
        let next = element.link_targets().next().unwrap();
        let cached = manager.cached_renderer(next).unwrap();

        // Act
        cached.next_button_clicked();
        manager.handle_next_button();
        manager.handle_back_button();
        settle().await;

        // Assert
        assert_eq!(events.try_recv().unwrap(), RenderManagerEvent::NextButtonClicked);
        assert_eq!(events.try_recv().unwrap(), RenderManagerEvent::PreviousButtonClicked);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_is_remembered_and_reapplied_on_swap() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events, element) = started(&fixture).await;
        manager.handle_volume_changed("music", 1.7);
        fixture.player.clear_calls();
        let next = element.link_targets().next().unwrap();
        let next_element = fixture.controller.narrative_element(next).unwrap();

        // Act
        manager
            .on_narrative_element_changed(next_element)
            .await
            .unwrap();

        // Assert
        assert_eq!(manager.session().volume("music"), Some(1.0));
        assert!(fixture.player.calls().contains(&PlayerCall::SetVolumeControlLevel {
            label: "music".to_owned(),
            value: 1.0,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_page_pauses_and_resumes_on_return() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events, _) = started(&fixture).await;
        fixture.player.clear_calls();

        // Act
        manager.handle_visibility_change(false);
        manager.handle_visibility_change(true);

        // Assert
        let calls = fixture.player.calls();
        assert_eq!(
            calls,
            vec![
                PlayerCall::Pause,
                PlayerCall::PauseBackgrounds,
                PlayerCall::Play,
                PlayerCall::PlayBackgrounds,
            ]
        );
        let visibility = fixture
            .analytics
            .names()
            .into_iter()
            .filter(|name| *name == AnalyticsEventName::BrowserVisibilityChange)
            .count();
        assert_eq!(visibility, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_page_while_paused_stays_paused_on_return() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events, _) = started(&fixture).await;
        manager.handle_play_pause(false);
        fixture.player.clear_calls();

        // Act
        manager.handle_visibility_change(false);
        manager.handle_visibility_change(true);

        // Assert
        assert!(fixture.player.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unswapped_renderer_is_torn_down_unless_cached() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events, element) = started(&fixture).await;
        let cached = manager
            .cached_renderer(element.link_targets().next().unwrap())
            .unwrap();
        let fresh = Renderer::construct(element.id, video(12.0), manager.shared.ctx.clone()).unwrap();
        settle().await;

        // Act
        manager.discard_unswapped(&fresh);
        manager.discard_unswapped(&cached);

        // Assert
        assert_eq!(fresh.phase(), RendererPhase::Destroyed);
        assert_eq!(cached.phase(), RendererPhase::Constructed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_destroys_every_renderer() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events, element) = started(&fixture).await;
        let current = manager.current_renderer().unwrap();
        let cached = manager
            .cached_renderer(element.link_targets().next().unwrap())
            .unwrap();

        // Act
        manager.reset();

        // Assert
        assert_eq!(current.phase(), RendererPhase::Destroyed);
        assert_eq!(cached.phase(), RendererPhase::Destroyed);
        assert!(manager.current_renderer().is_none());
        assert!(manager.cached_element_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_story_start_shows_launch_art() {
        // Arrange
        let fixture = StoryFixture::new();
        let art = media_collection("art.png");
        let story = Story {
            id: Uuid::new_v4(),
            name: "demo".to_owned(),
            meta: StoryMeta {
                on_launch: Some(LaunchConfig {
                    background_art_asset_collection_id: Some(art.id),
                    ..LaunchConfig::default()
                }),
            },
        };
        fixture.fetchers.add_asset_collection(art);
        fixture.fetchers.add_story(story.clone());
        let (manager, _events) = manager(&fixture);

        // Act
        manager.handle_story_start(story.id).await;

        // Assert
        assert_eq!(
            fixture.player.calls(),
            vec![PlayerCall::ShowStartScreen {
                art_url: Some("https://media.test/art.png".to_owned()),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_story_start_without_story_shows_plain_start_screen() {
        // Arrange
        let fixture = StoryFixture::new();
        let (manager, _events) = manager(&fixture);

        // Act
        manager.handle_story_start(Uuid::new_v4()).await;

        // Assert
        assert_eq!(
            fixture.player.calls(),
            vec![PlayerCall::ShowStartScreen { art_url: None }]
        );
    }
}
