//! Narrative graph and representation data model.
//!
//! Field names follow the story document format (snake_case JSON), so every
//! type here deserializes directly from fetched documents.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::behaviour::BehaviourSet;

const REPRESENTATION_TYPE_PREFIX: &str = "urn:x-object-based-media:representation-types:";

/// Asset collection type rendered by the looping background audio renderer.
pub const LOOPING_AUDIO_COLLECTION_TYPE: &str =
    "urn:x-object-based-media:asset-collection-types:looping-audio/v1.0";

/// A node in the experience graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeElement {
    /// Narrative element identifier.
    pub id: Uuid,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Body referencing the representation collection.
    #[serde(default)]
    pub body: NarrativeElementBody,
    /// Outbound links, in authoring order.
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Body of a narrative element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeElementBody {
    /// The representation collection that realises this element.
    #[serde(default)]
    pub representation_collection_target_id: Option<Uuid>,
}

/// An outbound link from a narrative element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Target element; `None` marks an end-of-story link.
    #[serde(default)]
    pub target_narrative_element_id: Option<Uuid>,
    /// Set while the user has chosen this link during a link-choice behaviour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_as_chosen: Option<bool>,
}

impl NarrativeElement {
    /// Ids of all link targets, in link order.
    pub fn link_targets(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.links
            .iter()
            .filter_map(|link| link.target_narrative_element_id)
    }
}

/// Representation type tag, parsed once from its URN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RepresentationKind {
    /// Audio/video media.
    Video,
    /// Audio-only media.
    Audio,
    /// Still image, optionally with a fixed duration.
    Image,
    /// Text panel.
    Text,
    /// Set of interchangeable sub-representations selected by label.
    Switchable,
    /// 360-degree media viewable in a headset.
    Immersive,
    /// A type no renderer handles.
    Unknown(String),
}

impl RepresentationKind {
    /// Returns the URN for this type.
    #[must_use]
    pub fn urn(&self) -> String {
        let suffix = match self {
            Self::Video => "simple-av/v1.0",
            Self::Audio => "simple-audio/v1.0",
            Self::Image => "image/v1.0",
            Self::Text => "simple-text/v1.0",
            Self::Switchable => "switchable/v1.0",
            Self::Immersive => "immersive/v1.0",
            Self::Unknown(urn) => return urn.clone(),
        };
        format!("{REPRESENTATION_TYPE_PREFIX}{suffix}")
    }

    /// Whether playback position is driven by timed media.
    #[must_use]
    pub fn is_time_based(&self) -> bool {
        matches!(self, Self::Video | Self::Audio | Self::Immersive)
    }

    /// Whether this type can be shown in a VR headset.
    #[must_use]
    pub fn is_vr_viewable(&self) -> bool {
        matches!(self, Self::Immersive)
    }
}

impl From<String> for RepresentationKind {
    fn from(urn: String) -> Self {
        match urn.strip_prefix(REPRESENTATION_TYPE_PREFIX) {
            Some("simple-av/v1.0") => Self::Video,
            Some("simple-audio/v1.0") => Self::Audio,
            Some("image/v1.0") => Self::Image,
            Some("simple-text/v1.0") => Self::Text,
            Some("switchable/v1.0") => Self::Switchable,
            Some("immersive/v1.0") => Self::Immersive,
            _ => Self::Unknown(urn),
        }
    }
}

impl From<RepresentationKind> for String {
    fn from(kind: RepresentationKind) -> Self {
        kind.urn()
    }
}

/// A concrete renderable realisation of a narrative element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    /// Representation identifier.
    pub id: Uuid,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Type tag.
    pub representation_type: RepresentationKind,
    /// Fixed duration in seconds, if any.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Asset collection references.
    #[serde(default)]
    pub asset_collections: RepresentationAssets,
    /// Behaviours partitioned by phase.
    #[serde(default)]
    pub behaviours: BehaviourSet,
    /// Sub-representations of a switchable.
    #[serde(default)]
    pub choices: Vec<RepresentationChoice>,
}

impl Representation {
    /// Duration in seconds; missing or negative durations are infinite.
    #[must_use]
    pub fn effective_duration(&self) -> f64 {
        match self.duration {
            Some(duration) if duration >= 0.0 => duration,
            _ => f64::INFINITY,
        }
    }

    /// Background audio asset collection ids.
    #[must_use]
    pub fn background_ids(&self) -> &[Uuid] {
        &self.asset_collections.background_ids
    }

    /// Resolves a behaviour asset-collection mapping id to an asset
    /// collection id.
    #[must_use]
    pub fn resolve_behaviour_asset(&self, mapping_id: Uuid) -> Option<Uuid> {
        self.asset_collections
            .behaviours
            .iter()
            .find(|mapping| mapping.behaviour_asset_collection_mapping_id == mapping_id)
            .map(|mapping| mapping.asset_collection_id)
    }
}

/// Asset collection references held by a representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepresentationAssets {
    /// Main media asset collection.
    #[serde(default)]
    pub foreground_id: Option<Uuid>,
    /// Background audio asset collections.
    #[serde(default)]
    pub background_ids: Vec<Uuid>,
    /// Optional background image for audio representations.
    #[serde(default)]
    pub background_image: Option<Uuid>,
    /// Link icon asset collections.
    #[serde(default)]
    pub icon: Option<IconAssets>,
    /// Mapping from behaviour-local ids to asset collections.
    #[serde(default)]
    pub behaviours: Vec<BehaviourAssetMapping>,
}

/// Icon asset collections for a representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IconAssets {
    /// Icon shown normally.
    #[serde(default)]
    pub default_id: Option<Uuid>,
    /// Icon shown while active.
    #[serde(default)]
    pub active_id: Option<Uuid>,
}

/// Maps a behaviour's asset reference to a concrete asset collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviourAssetMapping {
    /// Id used inside behaviour definitions.
    pub behaviour_asset_collection_mapping_id: Uuid,
    /// Asset collection it resolves to.
    pub asset_collection_id: Uuid,
}

/// One labelled option of a switchable representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationChoice {
    /// Label shared across switchables (e.g. a camera angle).
    pub label: String,
    /// The sub-representation.
    pub choice_representation: Representation,
}

/// A set of alternative representations for one narrative element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationCollection {
    /// Collection identifier.
    pub id: Uuid,
    /// Candidate representations in preference order.
    #[serde(default)]
    pub representations: Vec<RepresentationEntry>,
}

/// Wrapper for a representation inside a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationEntry {
    /// The candidate representation.
    pub representation: Representation,
}

/// A named bundle of media references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCollection {
    /// Asset collection identifier.
    pub id: Uuid,
    /// Collection type URN.
    #[serde(default)]
    pub asset_collection_type: String,
    /// Media sources.
    #[serde(default)]
    pub assets: Assets,
}

/// Media sources inside an asset collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assets {
    /// Audio source.
    #[serde(default)]
    pub audio_src: Option<String>,
    /// Image source.
    #[serde(default)]
    pub image_src: Option<String>,
    /// Audio/video source.
    #[serde(default)]
    pub av_src: Option<String>,
}

/// Top-level story metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Story identifier.
    pub id: Uuid,
    /// Story name.
    #[serde(default)]
    pub name: String,
    /// Presentation metadata.
    #[serde(default)]
    pub meta: StoryMeta,
}

/// Story presentation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryMeta {
    /// Start-screen configuration.
    #[serde(default)]
    pub on_launch: Option<LaunchConfig>,
}

/// Start-screen configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Asset collection holding the start-screen art.
    #[serde(default)]
    pub background_art_asset_collection_id: Option<Uuid>,
    /// Start button label.
    #[serde(default = "default_launch_text")]
    pub text: String,
    /// Hide next/back buttons on the start screen.
    #[serde(default = "default_true")]
    pub hide_narrative_buttons: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            background_art_asset_collection_id: None,
            text: default_launch_text(),
            hide_narrative_buttons: true,
        }
    }
}

fn default_launch_text() -> String {
    "Start".to_owned()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_representation_kind_parses_known_urns() {
        let kind: RepresentationKind = serde_json::from_value(json!(
            "urn:x-object-based-media:representation-types:simple-av/v1.0"
        ))
        .unwrap();
        assert_eq!(kind, RepresentationKind::Video);
        assert_eq!(
            RepresentationKind::from(RepresentationKind::Immersive.urn()),
            RepresentationKind::Immersive
        );
    }

    #[test]
    fn test_representation_kind_keeps_unknown_urn() {
        let kind = RepresentationKind::from("urn:x-custom:hologram".to_owned());
        assert_eq!(
            kind,
            RepresentationKind::Unknown("urn:x-custom:hologram".to_owned())
        );
        assert_eq!(kind.urn(), "urn:x-custom:hologram");
        assert!(!kind.is_time_based());
    }

    #[test]
    fn test_effective_duration_treats_missing_and_negative_as_infinite() {
        let mut representation: Representation = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "representation_type": "urn:x-object-based-media:representation-types:image/v1.0",
        }))
        .unwrap();
        assert!(representation.effective_duration().is_infinite());

        representation.duration = Some(-1.0);
        assert!(representation.effective_duration().is_infinite());

        representation.duration = Some(12.5);
        assert!((representation.effective_duration() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_narrative_element_deserializes_links() {
        let target = Uuid::new_v4();
        let element: NarrativeElement = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "intro",
            "body": { "representation_collection_target_id": Uuid::new_v4() },
            "links": [
                { "target_narrative_element_id": target },
                { }
            ],
        }))
        .unwrap();

        assert_eq!(element.links.len(), 2);
        assert_eq!(element.link_targets().collect::<Vec<_>>(), vec![target]);
        assert!(element.body.representation_collection_target_id.is_some());
    }

    #[test]
    fn test_resolve_behaviour_asset_maps_ids() {
        let mapping_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let representation: Representation = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "representation_type": "urn:x-object-based-media:representation-types:simple-av/v1.0",
            "asset_collections": {
                "behaviours": [{
                    "behaviour_asset_collection_mapping_id": mapping_id,
                    "asset_collection_id": collection_id,
                }]
            }
        }))
        .unwrap();

        assert_eq!(
            representation.resolve_behaviour_asset(mapping_id),
            Some(collection_id)
        );
        assert_eq!(representation.resolve_behaviour_asset(Uuid::new_v4()), None);
    }
}
