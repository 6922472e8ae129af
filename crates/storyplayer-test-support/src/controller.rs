//! Stub controller over an in-memory narrative graph.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use storyplayer_core::controller::{Controller, NextStep};
use storyplayer_core::error::PlayerError;
use storyplayer_core::model::NarrativeElement;
use uuid::Uuid;

/// A controller whose graph, position and history are set by the test.
///
/// Valid next steps are every link of the current element whose target is
/// in the graph. Link overrides and followed links are recorded.
#[derive(Debug, Default)]
pub struct StubController {
    elements: Mutex<HashMap<Uuid, NarrativeElement>>,
    current: Mutex<Option<Uuid>>,
    previous: Mutex<Option<Uuid>>,
    variables: Mutex<HashMap<String, Value>>,
    overrides: Mutex<Vec<(Uuid, Option<Uuid>)>>,
    followed: Mutex<Vec<Uuid>>,
    control_refreshes: AtomicUsize,
}

impl StubController {
    /// Create a controller with an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an element in the graph.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, element: NarrativeElement) {
        self.elements.lock().unwrap().insert(element.id, element);
    }

    /// Moves the controller to `id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_current(&self, id: Uuid) {
        *self.current.lock().unwrap() = Some(id);
    }

    /// Sets the element reported as previous.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_previous(&self, id: Option<Uuid>) {
        *self.previous.lock().unwrap() = id;
    }

    /// Returns every `set_link_override` call made so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn overrides(&self) -> Vec<(Uuid, Option<Uuid>)> {
        self.overrides.lock().unwrap().clone()
    }

    /// Returns every link followed so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn followed_links(&self) -> Vec<Uuid> {
        self.followed.lock().unwrap().clone()
    }

    /// Returns a variable's value.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.lock().unwrap().get(name).cloned()
    }

    /// Number of `refresh_player_controls` calls.
    pub fn control_refreshes(&self) -> usize {
        self.control_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Controller for StubController {
    fn current_narrative_element(&self) -> Option<NarrativeElement> {
        let current = (*self.current.lock().unwrap())?;
        self.narrative_element(current)
    }

    fn narrative_element(&self, id: Uuid) -> Option<NarrativeElement> {
        self.elements.lock().unwrap().get(&id).cloned()
    }

    async fn id_of_previous_node(&self) -> Result<Option<Uuid>, PlayerError> {
        Ok(*self.previous.lock().unwrap())
    }

    async fn ids_of_next_nodes(&self, element: &NarrativeElement) -> Result<Vec<Uuid>, PlayerError> {
        let element = self.narrative_element(element.id).unwrap_or_else(|| element.clone());
        Ok(element.link_targets().collect())
    }

    async fn valid_next_steps(&self) -> Result<Vec<NextStep>, PlayerError> {
        let Some(current) = self.current_narrative_element() else {
            return Ok(Vec::new());
        };
        Ok(current
            .link_targets()
            .filter_map(|target| {
                self.narrative_element(target).map(|narrative_element| NextStep {
                    narrative_element,
                    target_narrative_element_id: target,
                })
            })
            .collect())
    }

    async fn variable_value(&self, name: &str) -> Result<Option<Value>, PlayerError> {
        Ok(self.variable(name))
    }

    async fn set_variable_value(&self, name: &str, value: Value) -> Result<(), PlayerError> {
        self.variables.lock().unwrap().insert(name.to_owned(), value);
        Ok(())
    }

    fn set_link_override(&self, element_id: Uuid, chosen: Option<Uuid>) {
        self.overrides.lock().unwrap().push((element_id, chosen));
        if let Some(element) = self.elements.lock().unwrap().get_mut(&element_id) {
            for link in &mut element.links {
                link.override_as_chosen = chosen
                    .filter(|chosen| link.target_narrative_element_id == Some(*chosen))
                    .map(|_| true);
            }
        }
    }

    fn follow_link(&self, target: Uuid) {
        self.followed.lock().unwrap().push(target);
    }

    fn refresh_player_controls(&self) {
        self.control_refreshes.fetch_add(1, Ordering::SeqCst);
    }
}
