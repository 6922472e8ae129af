//! Controller contract: owner of the narrative graph and story variables.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::PlayerError;
use crate::model::NarrativeElement;

/// A currently valid onward step from the current narrative element.
#[derive(Debug, Clone, PartialEq)]
pub struct NextStep {
    /// The target narrative element.
    pub narrative_element: NarrativeElement,
    /// Target id (same as `narrative_element.id`).
    pub target_narrative_element_id: Uuid,
}

/// Notifications published by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The controller moved to a new (or the same) narrative element.
    NarrativeElementChanged(NarrativeElement),
    /// A story variable changed value.
    VariableChanged {
        /// Variable name.
        name: String,
    },
}

/// Graph traversal and variable state, owned outside the render core.
#[async_trait]
pub trait Controller: Send + Sync {
    /// The element currently being played, if any.
    fn current_narrative_element(&self) -> Option<NarrativeElement>;

    /// Looks up an element by id.
    fn narrative_element(&self, id: Uuid) -> Option<NarrativeElement>;

    /// The element the user would return to with "back", if any.
    async fn id_of_previous_node(&self) -> Result<Option<Uuid>, PlayerError>;

    /// All elements reachable in one step from `element`, under the current
    /// variable state.
    async fn ids_of_next_nodes(&self, element: &NarrativeElement) -> Result<Vec<Uuid>, PlayerError>;

    /// Valid onward steps from the current element.
    async fn valid_next_steps(&self) -> Result<Vec<NextStep>, PlayerError>;

    /// Reads a story variable.
    async fn variable_value(&self, name: &str) -> Result<Option<Value>, PlayerError>;

    /// Writes a story variable.
    async fn set_variable_value(&self, name: &str, value: Value) -> Result<(), PlayerError>;

    /// Marks `chosen` as the user's chosen link out of `element_id`, or
    /// clears every chosen override when `chosen` is `None`.
    fn set_link_override(&self, element_id: Uuid, chosen: Option<Uuid>);

    /// Navigates along the link to `target`.
    fn follow_link(&self, target: Uuid);

    /// Re-evaluates the player's next/back controls.
    fn refresh_player_controls(&self);
}
