//! Behaviour handler registry.
//!
//! Behaviour definitions are matched to a handler once, when a renderer is
//! built. Unknown types are dropped with a warning and never reach playback.

use storyplayer_core::behaviour::{BehaviourDefinition, BehaviourKind, BehaviourSet};
use storyplayer_core::error::PlayerError;
use tracing::warn;

/// How the renderer carries out a behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviourHandler {
    /// Hand the definition to the player for display.
    Present,
    /// Resolve the image asset, then hand it to the player.
    ShowImage,
    /// Present the variable panel and track that it is open.
    VariablePanel,
    /// Build and show link choice icons.
    LinkChoices,
    /// Hold for a number of seconds, or until released.
    Pause,
    /// Write story variables through the controller.
    ManipulateVariable,
}

impl BehaviourHandler {
    /// Handler registered for a behaviour kind.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::UnknownBehaviourType` for a kind with no
    /// handler.
    pub fn for_kind(kind: &BehaviourKind) -> Result<Self, PlayerError> {
        match kind {
            BehaviourKind::ShowImage => Ok(Self::ShowImage),
            BehaviourKind::ShowVariablePanel => Ok(Self::VariablePanel),
            BehaviourKind::ShowLinkChoices => Ok(Self::LinkChoices),
            BehaviourKind::Pause => Ok(Self::Pause),
            BehaviourKind::ManipulateVariable => Ok(Self::ManipulateVariable),
            BehaviourKind::ColourOverlay
            | BehaviourKind::SocialShare
            | BehaviourKind::LinkOut
            | BehaviourKind::TextOverlay
            | BehaviourKind::MapOverlay
            | BehaviourKind::FadeIn
            | BehaviourKind::FadeOut
            | BehaviourKind::FadeAudioIn
            | BehaviourKind::FadeAudioOut => Ok(Self::Present),
            BehaviourKind::Unknown(urn) => Err(PlayerError::UnknownBehaviourType(urn.clone())),
        }
    }
}

/// A behaviour paired with its handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBehaviour {
    /// The definition as authored.
    pub definition: BehaviourDefinition,
    /// Handler chosen for its kind.
    pub handler: BehaviourHandler,
}

/// A during-behaviour with its window resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDuring {
    /// Window start in seconds.
    pub start_time: f64,
    /// Window end in seconds; infinite when open-ended.
    pub end_time: f64,
    /// The behaviour to run inside the window.
    pub behaviour: ResolvedBehaviour,
}

/// Behaviours of a representation, resolved against the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviourPlan {
    /// Run before the renderer starts.
    pub started: Vec<ResolvedBehaviour>,
    /// Run inside time windows during playback.
    pub during: Vec<ResolvedDuring>,
    /// Run when the media completes.
    pub completed: Vec<ResolvedBehaviour>,
}

impl BehaviourPlan {
    /// Resolves every behaviour of a set, skipping unknown types.
    #[must_use]
    pub fn resolve(set: &BehaviourSet) -> Self {
        Self {
            started: set.started.iter().filter_map(resolve).collect(),
            during: set
                .during
                .iter()
                .filter_map(|during| {
                    resolve(&during.behaviour).map(|behaviour| ResolvedDuring {
                        start_time: during.start_time,
                        end_time: during.end_time(),
                        behaviour,
                    })
                })
                .collect(),
            completed: set.completed.iter().filter_map(resolve).collect(),
        }
    }

    /// Whether any phase carries a behaviour of the given kind.
    #[must_use]
    pub fn contains_kind(&self, kind: &BehaviourKind) -> bool {
        self.started
            .iter()
            .chain(self.completed.iter())
            .chain(self.during.iter().map(|during| &during.behaviour))
            .any(|behaviour| &behaviour.definition.kind == kind)
    }

    /// Earliest start time of a during link-choice behaviour.
    #[must_use]
    pub fn choice_time(&self) -> Option<f64> {
        self.during
            .iter()
            .filter(|during| during.behaviour.handler == BehaviourHandler::LinkChoices)
            .map(|during| during.start_time)
            .reduce(f64::min)
    }
}

fn resolve(definition: &BehaviourDefinition) -> Option<ResolvedBehaviour> {
    match BehaviourHandler::for_kind(&definition.kind) {
        Ok(handler) => Some(ResolvedBehaviour {
            definition: definition.clone(),
            handler,
        }),
        Err(error) => {
            warn!(behaviour_id = %definition.id, %error, "skipping behaviour");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use storyplayer_core::behaviour::DuringBehaviour;
    use uuid::Uuid;

    use super::*;

    fn definition(kind: BehaviourKind) -> BehaviourDefinition {
        BehaviourDefinition {
            id: Uuid::new_v4(),
            kind,
            params: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_unknown_behaviours_are_skipped() {
        // Arrange
        let set = BehaviourSet {
            started: vec![
                definition(BehaviourKind::Unknown("urn:example:wobble".to_owned())),
                definition(BehaviourKind::Pause),
            ],
            during: Vec::new(),
            completed: vec![definition(BehaviourKind::Unknown("x".to_owned()))],
        };

        // Act
        let plan = BehaviourPlan::resolve(&set);

        // Assert
        assert_eq!(plan.started.len(), 1);
        assert_eq!(plan.started[0].handler, BehaviourHandler::Pause);
        assert!(plan.completed.is_empty());
    }

    #[test]
    fn test_during_windows_resolve_open_ended() {
        // Arrange
        let set = BehaviourSet {
            started: Vec::new(),
            during: vec![
                DuringBehaviour {
                    start_time: 12.0,
                    duration: None,
                    behaviour: definition(BehaviourKind::ShowLinkChoices),
                },
                DuringBehaviour {
                    start_time: 3.0,
                    duration: Some(2.0),
                    behaviour: definition(BehaviourKind::TextOverlay),
                },
            ],
            completed: Vec::new(),
        };

        // Act
        let plan = BehaviourPlan::resolve(&set);

        // Assert
        assert!(plan.during[0].end_time.is_infinite());
        assert!((plan.during[1].end_time - 5.0).abs() < f64::EPSILON);
        assert_eq!(plan.choice_time(), Some(12.0));
        assert!(plan.contains_kind(&BehaviourKind::ShowLinkChoices));
    }

    #[test]
    fn test_presentational_kinds_share_a_handler() {
        for kind in [
            BehaviourKind::ColourOverlay,
            BehaviourKind::TextOverlay,
            BehaviourKind::FadeAudioOut,
        ] {
            assert_eq!(BehaviourHandler::for_kind(&kind).unwrap(), BehaviourHandler::Present);
        }
        let mut variables = definition(BehaviourKind::ManipulateVariable);
        variables.params.insert("variables".to_owned(), json!([]));
        assert_eq!(
            BehaviourHandler::for_kind(&variables.kind).unwrap(),
            BehaviourHandler::ManipulateVariable
        );
    }

    #[test]
    fn test_unknown_kind_has_no_handler() {
        let kind = BehaviourKind::Unknown("urn:example:confetti".to_owned());
        assert!(matches!(
            BehaviourHandler::for_kind(&kind),
            Err(PlayerError::UnknownBehaviourType(urn)) if urn == "urn:example:confetti"
        ));
    }
}
