//! Walks a story document through the render manager on a simulated clock.

use std::sync::Arc;
use std::time::Duration;

use storyplayer_core::analytics::{
    AnalyticsEventName, AnalyticsEventType, AnalyticsLogger, AnalyticsPayload,
};
use storyplayer_core::config::PlayerConfig;
use storyplayer_render::application::render_manager::{Collaborators, RenderManager};
use storyplayer_render::domain::events::RenderManagerEvent;
use storyplayer_render::domain::phase::RendererPhase;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::TracingAnalytics;
use crate::controller::WalkingController;
use crate::document::{DocumentFetchers, FirstRepresentationReasoner, StoryDocument};
use crate::error::HeadlessError;
use crate::playout::SimulatedPlayer;

/// How the walk is paced and bounded.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Stop after this many elements have been shown.
    pub max_steps: usize,
    /// Real time between simulated clock steps.
    pub tick: Duration,
    /// Simulated seconds per real second.
    pub playback_rate: f64,
    /// How long untimed elements and open-ended pauses are held.
    pub still_secs: f64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_steps: 200,
            tick: Duration::from_millis(10),
            playback_rate: 1.0,
            still_secs: 3.0,
        }
    }
}

/// Why a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// The last element completed with no onward link.
    Finished,
    /// The step limit was reached.
    StepLimit,
}

/// Outcome of a walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkSummary {
    /// Elements shown, in order.
    pub visited: Vec<Uuid>,
    /// Why the walk stopped.
    pub end: WalkEnd,
}

/// Plays a story from its start element until it ends.
#[derive(Debug)]
pub struct HeadlessDriver {
    document: StoryDocument,
    config: PlayerConfig,
    options: DriverOptions,
}

impl HeadlessDriver {
    /// Create a driver for `document`.
    #[must_use]
    pub fn new(document: StoryDocument, config: PlayerConfig, options: DriverOptions) -> Self {
        Self {
            document,
            config,
            options,
        }
    }

    /// Runs the walk. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `HeadlessError::Player` if the start element cannot be
    /// entered.
    pub async fn run(self) -> Result<WalkSummary, HeadlessError> {
        let (controller, controller_events) =
            WalkingController::new(self.document.narrative_elements.iter().cloned());
        let controller = Arc::new(controller);
        let player = Arc::new(SimulatedPlayer::new());
        let analytics = Arc::new(TracingAnalytics);
        let (manager, mut events) = RenderManager::new(
            Collaborators {
                controller: controller.clone(),
                reasoner: Arc::new(FirstRepresentationReasoner),
                fetchers: Arc::new(DocumentFetchers::new(&self.document)),
                player: player.clone(),
                analytics: analytics.clone(),
            },
            self.config.clone(),
        );

        info!(story_id = %self.document.story_id, name = %self.document.name, "starting story");
        manager.handle_story_start(self.document.story_id).await;
        player.press_start();
        analytics.log(AnalyticsPayload::user_action(
            AnalyticsEventName::StartButtonClicked,
            None,
            None,
        ));
        let transitions = tokio::spawn(manager.clone().run(controller_events));
        controller.go_to(self.document.start_narrative_element_id)?;

        let mut ticker = tokio::time::interval(self.options.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let step_secs = self.options.tick.as_secs_f64() * self.options.playback_rate;
        let mut clock = WalkClock::default();
        let mut visited = Vec::new();

        let end = loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("render manager stopped");
                        break WalkEnd::Finished;
                    };
                    match event {
                        RenderManagerEvent::NarrativeElementRendered {
                            narrative_element_id,
                            representation_id,
                        } => {
                            info!(%narrative_element_id, %representation_id, step = visited.len() + 1, "element shown");
                            visited.push(narrative_element_id);
                            clock = WalkClock::default();
                            if visited.len() >= self.options.max_steps {
                                warn!(max_steps = self.options.max_steps, "step limit reached");
                                break WalkEnd::StepLimit;
                            }
                        }
                        RenderManagerEvent::Completed { narrative_element_id } => {
                            info!(%narrative_element_id, "element completed");
                            if !controller.advance() {
                                analytics.log(AnalyticsPayload::new(
                                    AnalyticsEventType::SegmentCompletion,
                                    AnalyticsEventName::StoryEnd,
                                ));
                                break WalkEnd::Finished;
                            }
                        }
                        RenderManagerEvent::NextButtonClicked => {
                            controller.advance();
                        }
                        RenderManagerEvent::PreviousButtonClicked => {
                            controller.go_back();
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.step(&manager, &player, step_secs, &mut clock);
                }
            }
        };

        transitions.abort();
        manager.reset();
        info!(steps = visited.len(), ?end, "walk finished");
        Ok(WalkSummary { visited, end })
    }

    /// One simulated clock step: answers link choices, moves the playout
    /// clock and reports media end.
    fn step(
        &self,
        manager: &RenderManager,
        player: &SimulatedPlayer,
        secs: f64,
        clock: &mut WalkClock,
    ) {
        if let Some(choices) = player.take_link_choices() {
            let target = choices.default_target.or_else(|| {
                choices
                    .choices
                    .first()
                    .map(|choice| choice.target_narrative_element_id)
            });
            if let Some(target) = target {
                info!(%target, "choosing link");
                manager.handle_link_chosen(target);
            }
        }

        let Some(renderer) = manager.current_renderer() else {
            return;
        };
        if renderer.in_pause() {
            clock.held += secs;
            if clock.held >= self.options.still_secs {
                clock.held = 0.0;
                renderer.exit_complete_pause();
            }
            return;
        }
        if renderer.phase() != RendererPhase::Main || clock.finished {
            return;
        }

        player.advance(secs);
        let finished = match renderer.current_time().remaining_time {
            Some(remaining) => remaining <= 0.0,
            None => {
                clock.held += secs;
                clock.held >= self.options.still_secs
            }
        };
        if finished {
            clock.finished = true;
            renderer.media_finished();
        }
    }
}

/// Per-element progress of the simulated clock.
#[derive(Debug, Default)]
struct WalkClock {
    held: f64,
    finished: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn element(id: Uuid, collection: Uuid, targets: &[Uuid]) -> Value {
        json!({
            "id": id,
            "name": format!("element {id}"),
            "body": { "representation_collection_target_id": collection },
            "links": targets
                .iter()
                .map(|target| json!({ "target_narrative_element_id": target }))
                .collect::<Vec<_>>(),
        })
    }

    fn collection(id: Uuid, duration: f64) -> Value {
        json!({
            "id": id,
            "representations": [{
                "representation": {
                    "id": Uuid::new_v4(),
                    "representation_type": "urn:x-object-based-media:representation-types:simple-av/v1.0",
                    "duration": duration,
                }
            }],
        })
    }

    /// A story whose elements link in a chain, the last one optionally back
    /// to the first.
    fn chain(length: usize, looping: bool) -> (StoryDocument, Vec<Uuid>) {
        let ids: Vec<Uuid> = (0..length).map(|_| Uuid::new_v4()).collect();
        let collections: Vec<Uuid> = (0..length).map(|_| Uuid::new_v4()).collect();
        let elements: Vec<Value> = (0..length)
            .map(|index| {
                let next = if index + 1 < length {
                    vec![ids[index + 1]]
                } else if looping {
                    vec![ids[0]]
                } else {
                    Vec::new()
                };
                element(ids[index], collections[index], &next)
            })
            .collect();
        let document = json!({
            "story_id": Uuid::new_v4(),
            "name": "chain",
            "start_narrative_element_id": ids[0],
            "narrative_elements": elements,
            "representation_collections": collections
                .iter()
                .map(|id| collection(*id, 1.0))
                .collect::<Vec<_>>(),
        });
        (StoryDocument::from_json(&document.to_string()).unwrap(), ids)
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_visits_every_element_until_the_end() {
        // Arrange
        let (document, ids) = chain(3, false);
        let driver = HeadlessDriver::new(document, PlayerConfig::default(), DriverOptions::default());

        // Act
        let summary = driver.run().await.unwrap();

        // Assert
        assert_eq!(summary.end, WalkEnd::Finished);
        assert_eq!(summary.visited, ids);
    }

    #[tokio::test(start_paused = true)]
    async fn test_looping_story_stops_at_step_limit() {
        // Arrange
        let (document, ids) = chain(2, true);
        let options = DriverOptions {
            max_steps: 5,
            ..DriverOptions::default()
        };
        let driver = HeadlessDriver::new(document, PlayerConfig::default(), options);

        // Act
        let summary = driver.run().await.unwrap();

        // Assert
        assert_eq!(summary.end, WalkEnd::StepLimit);
        assert_eq!(summary.visited, vec![ids[0], ids[1], ids[0], ids[1], ids[0]]);
    }
}
