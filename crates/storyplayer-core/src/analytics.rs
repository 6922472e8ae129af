//! Analytics event catalog and logger contract.

use serde::Serialize;

/// Category of an analytics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEventType {
    /// Movement through the story graph.
    StoryNavigation,
    /// Something a renderer did on its own.
    RendererAction,
    /// Something the user did.
    UserAction,
    /// A segment finished.
    SegmentCompletion,
}

/// Fixed catalog of analytics event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEventName {
    NarrativeElementChange,
    EnterSubStory,
    StoryEnd,
    SwitchableRepresentationSwitch,
    CompleteBehaviourPhaseStarted,
    DuringBehaviourStarted,
    VideoPause,
    VideoUnpause,
    PlayPauseButtonClicked,
    SeekForwardButtonClicked,
    SeekBackwardButtonClicked,
    BackButtonClicked,
    NextButtonClicked,
    StartButtonClicked,
    SubtitlesButtonClicked,
    FullscreenButtonClicked,
    VolumeChanged,
    VolumeMuteToggled,
    VideoScrubbed,
    OverlayButtonClicked,
    LinkChoiceClicked,
    BehaviourContinueButtonClicked,
    BehaviourCancelButtonClicked,
    VrOrientationChanged,
    BrowserVisibilityChange,
    UserSetVariable,
    VariablePanelNextClicked,
    VariablePanelBackClicked,
    SocialShareClicked,
    OutwardLinkClicked,
    MapOverlayLinkClicked,
}

/// Placeholder recorded when an event has no meaningful endpoint.
pub const NOT_SET: &str = "not_set";

/// A single analytics record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsPayload {
    /// Event category.
    #[serde(rename = "type")]
    pub event_type: AnalyticsEventType,
    /// Event name.
    pub name: AnalyticsEventName,
    /// Origin of the change, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Destination of the change, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl AnalyticsPayload {
    /// Creates a payload without endpoints.
    #[must_use]
    pub fn new(event_type: AnalyticsEventType, name: AnalyticsEventName) -> Self {
        Self {
            event_type,
            name,
            from: None,
            to: None,
        }
    }

    /// Sets the `from` and `to` endpoints.
    #[must_use]
    pub fn between(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }

    /// A renderer action with both endpoints `not_set`.
    #[must_use]
    pub fn renderer_action(name: AnalyticsEventName) -> Self {
        Self::new(AnalyticsEventType::RendererAction, name).between(NOT_SET, NOT_SET)
    }

    /// A user action between two optional endpoints.
    #[must_use]
    pub fn user_action(name: AnalyticsEventName, from: Option<String>, to: Option<String>) -> Self {
        Self::new(AnalyticsEventType::UserAction, name).between(
            from.unwrap_or_else(|| NOT_SET.to_owned()),
            to.unwrap_or_else(|| NOT_SET.to_owned()),
        )
    }
}

/// Fire-and-forget analytics sink. The player never branches on its outcome.
pub trait AnalyticsLogger: Send + Sync {
    /// Records one analytics payload.
    fn log(&self, payload: AnalyticsPayload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serializes_with_catalog_names() {
        let payload = AnalyticsPayload::new(
            AnalyticsEventType::StoryNavigation,
            AnalyticsEventName::NarrativeElementChange,
        )
        .between("a", "b");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "STORY_NAVIGATION");
        assert_eq!(json["name"], "NARRATIVE_ELEMENT_CHANGE");
        assert_eq!(json["from"], "a");
        assert_eq!(json["to"], "b");
    }

    #[test]
    fn test_user_action_defaults_missing_endpoints() {
        let payload = AnalyticsPayload::user_action(AnalyticsEventName::VideoScrubbed, None, None);
        assert_eq!(payload.from.as_deref(), Some(NOT_SET));
        assert_eq!(payload.to.as_deref(), Some(NOT_SET));
    }

    #[test]
    fn test_payload_without_endpoints_omits_them() {
        let json = serde_json::to_value(AnalyticsPayload::new(
            AnalyticsEventType::SegmentCompletion,
            AnalyticsEventName::StoryEnd,
        ))
        .unwrap();
        assert!(json.get("from").is_none());
        assert_eq!(json["name"], "STORY_END");
    }
}
