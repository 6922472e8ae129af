//! Typed signals emitted by renderers and the render manager.

use storyplayer_core::model::Representation;
use uuid::Uuid;

/// Signals a renderer sends to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// Construction finished.
    Constructed,
    /// The renderer entered its main phase.
    Started,
    /// Completion behaviours began.
    StartedCompleteBehaviours,
    /// All completion behaviours finished.
    Completed,
    /// The renderer released its resources.
    Destroyed,
    /// The user pressed next while this renderer was showing.
    NextButtonClicked,
    /// The user pressed back while this renderer was showing.
    PreviousButtonClicked,
    /// A switchable moved to another of its choices.
    SwitchedRepresentation {
        /// Label of the new choice.
        label: String,
        /// The chosen sub-representation.
        representation: Box<Representation>,
    },
}

/// A renderer event tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererMessage {
    /// The renderer that emitted the event.
    pub renderer_id: Uuid,
    /// The event.
    pub event: RendererEvent,
}

/// Signals the render manager sends to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderManagerEvent {
    /// A new renderer became current.
    NarrativeElementRendered {
        /// The element now showing.
        narrative_element_id: Uuid,
        /// The representation chosen for it.
        representation_id: Uuid,
    },
    /// The current renderer completed.
    Completed {
        /// The element that completed.
        narrative_element_id: Uuid,
    },
    /// The user asked to move forward.
    NextButtonClicked,
    /// The user asked to move back.
    PreviousButtonClicked,
}
