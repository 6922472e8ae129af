//! A controller that walks the story graph along the first valid link.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use storyplayer_core::controller::{Controller, ControllerEvent, NextStep};
use storyplayer_core::error::PlayerError;
use storyplayer_core::model::NarrativeElement;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Default)]
struct WalkState {
    elements: HashMap<Uuid, NarrativeElement>,
    history: Vec<Uuid>,
    variables: HashMap<String, Value>,
}

impl WalkState {
    fn current(&self) -> Option<&NarrativeElement> {
        self.history.last().and_then(|id| self.elements.get(id))
    }

    /// The link a walk takes from `element`: a chosen link first, then the
    /// first link whose target exists.
    fn onward_from(&self, element: &NarrativeElement) -> Option<Uuid> {
        let reachable = |target: &Uuid| self.elements.contains_key(target);
        element
            .links
            .iter()
            .filter(|link| link.override_as_chosen == Some(true))
            .filter_map(|link| link.target_narrative_element_id)
            .find(reachable)
            .or_else(|| element.link_targets().find(reachable))
    }
}

/// Owns the narrative graph for a headless walk and announces every move on
/// a [`ControllerEvent`] channel.
#[derive(Debug)]
pub struct WalkingController {
    state: Mutex<WalkState>,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl WalkingController {
    /// Creates a controller over `elements` and the receiver for its
    /// notifications.
    #[must_use]
    pub fn new(
        elements: impl IntoIterator<Item = NarrativeElement>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let state = WalkState {
            elements: elements
                .into_iter()
                .map(|element| (element.id, element))
                .collect(),
            ..WalkState::default()
        };
        (
            Self {
                state: Mutex::new(state),
                events,
            },
            receiver,
        )
    }

    /// Moves to `id`.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NarrativeElementNotFound` if `id` is not in the
    /// graph.
    pub fn go_to(&self, id: Uuid) -> Result<(), PlayerError> {
        let element = {
            let mut state = self.lock();
            let element = state
                .elements
                .get(&id)
                .cloned()
                .ok_or(PlayerError::NarrativeElementNotFound(id))?;
            state.history.push(id);
            element
        };
        info!(narrative_element_id = %id, name = %element.name, "moved to narrative element");
        self.announce(ControllerEvent::NarrativeElementChanged(element));
        Ok(())
    }

    /// Follows the walk's onward link. Returns `false` at the end of the
    /// story.
    pub fn advance(&self) -> bool {
        let next = {
            let state = self.lock();
            state
                .current()
                .and_then(|current| state.onward_from(current))
        };
        match next {
            Some(next) => self.go_to(next).is_ok(),
            None => {
                debug!("no onward link; story ends");
                false
            }
        }
    }

    /// Steps back to the previous element. Returns `false` when there is
    /// none.
    pub fn go_back(&self) -> bool {
        let element = {
            let mut state = self.lock();
            if state.history.len() < 2 {
                return false;
            }
            state.history.pop();
            state.current().cloned()
        };
        match element {
            Some(element) => {
                info!(narrative_element_id = %element.id, "stepped back");
                self.announce(ControllerEvent::NarrativeElementChanged(element));
                true
            }
            None => false,
        }
    }

    /// Element ids visited so far, in order.
    #[must_use]
    pub fn history(&self) -> Vec<Uuid> {
        self.lock().history.clone()
    }

    fn announce(&self, event: ControllerEvent) {
        if self.events.send(event).is_err() {
            debug!("controller event receiver closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, WalkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Controller for WalkingController {
    fn current_narrative_element(&self) -> Option<NarrativeElement> {
        self.lock().current().cloned()
    }

    fn narrative_element(&self, id: Uuid) -> Option<NarrativeElement> {
        self.lock().elements.get(&id).cloned()
    }

    async fn id_of_previous_node(&self) -> Result<Option<Uuid>, PlayerError> {
        let state = self.lock();
        Ok(state.history.iter().rev().nth(1).copied())
    }

    async fn ids_of_next_nodes(&self, element: &NarrativeElement) -> Result<Vec<Uuid>, PlayerError> {
        let state = self.lock();
        let element = state.elements.get(&element.id).unwrap_or(element);
        Ok(element
            .link_targets()
            .filter(|target| state.elements.contains_key(target))
            .collect())
    }

    async fn valid_next_steps(&self) -> Result<Vec<NextStep>, PlayerError> {
        let state = self.lock();
        let Some(current) = state.current() else {
            return Ok(Vec::new());
        };
        Ok(current
            .link_targets()
            .filter_map(|target| {
                state.elements.get(&target).map(|element| NextStep {
                    narrative_element: element.clone(),
                    target_narrative_element_id: target,
                })
            })
            .collect())
    }

    async fn variable_value(&self, name: &str) -> Result<Option<Value>, PlayerError> {
        Ok(self.lock().variables.get(name).cloned())
    }

    async fn set_variable_value(&self, name: &str, value: Value) -> Result<(), PlayerError> {
        info!(variable = name, %value, "story variable set");
        self.lock().variables.insert(name.to_owned(), value);
        self.announce(ControllerEvent::VariableChanged {
            name: name.to_owned(),
        });
        Ok(())
    }

    fn set_link_override(&self, element_id: Uuid, chosen: Option<Uuid>) {
        let mut state = self.lock();
        if let Some(element) = state.elements.get_mut(&element_id) {
            for link in &mut element.links {
                link.override_as_chosen = chosen
                    .filter(|chosen| link.target_narrative_element_id == Some(*chosen))
                    .map(|_| true);
            }
        }
    }

    fn follow_link(&self, target: Uuid) {
        if let Err(error) = self.go_to(target) {
            debug!(%error, "link target not in story");
        }
    }

    fn refresh_player_controls(&self) {
        debug!("player controls refreshed");
    }
}

#[cfg(test)]
mod tests {
    use storyplayer_core::model::{Link, NarrativeElementBody};

    use super::*;

    fn element(id: Uuid, targets: &[Uuid]) -> NarrativeElement {
        NarrativeElement {
            id,
            name: format!("element {id}"),
            body: NarrativeElementBody::default(),
            links: targets
                .iter()
                .map(|target| Link {
                    target_narrative_element_id: Some(*target),
                    override_as_chosen: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_advance_takes_first_link_then_ends() {
        // Arrange
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (controller, mut events) = WalkingController::new([element(a, &[b]), element(b, &[])]);
        controller.go_to(a).unwrap();

        // Act
        let moved = controller.advance();
        let moved_again = controller.advance();

        // Assert
        assert!(moved);
        assert!(!moved_again);
        assert_eq!(controller.history(), vec![a, b]);
        let announced: Vec<Uuid> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|event| match event {
                ControllerEvent::NarrativeElementChanged(element) => Some(element.id),
                ControllerEvent::VariableChanged { .. } => None,
            })
            .collect();
        assert_eq!(announced, vec![a, b]);
    }

    #[test]
    fn test_advance_prefers_chosen_link() {
        // Arrange
        let (a, left, right) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (controller, _events) = WalkingController::new([
            element(a, &[left, right]),
            element(left, &[]),
            element(right, &[]),
        ]);
        controller.go_to(a).unwrap();

        // Act
        controller.set_link_override(a, Some(right));
        controller.advance();

        // Assert
        assert_eq!(controller.current_narrative_element().unwrap().id, right);
    }

    #[tokio::test]
    async fn test_previous_node_follows_history() {
        // Arrange
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (controller, _events) = WalkingController::new([element(a, &[b]), element(b, &[a])]);
        controller.go_to(a).unwrap();
        assert_eq!(controller.id_of_previous_node().await.unwrap(), None);

        // Act
        controller.advance();

        // Assert
        assert_eq!(controller.id_of_previous_node().await.unwrap(), Some(a));
        assert!(controller.go_back());
        assert_eq!(controller.current_narrative_element().unwrap().id, a);
        assert!(!controller.go_back());
    }

    #[test]
    fn test_go_to_unknown_element_fails() {
        // Arrange
        let (controller, _events) = WalkingController::new([]);

        // Act
        let result = controller.go_to(Uuid::new_v4());

        // Assert
        assert!(matches!(result, Err(PlayerError::NarrativeElementNotFound(_))));
    }
}
