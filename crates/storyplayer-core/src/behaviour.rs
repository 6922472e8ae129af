//! Behaviour definitions attached to representations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const BEHAVIOUR_TYPE_PREFIX: &str = "urn:x-object-based-media:representation-behaviour:";

/// Behaviour type tag, parsed once from its URN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BehaviourKind {
    /// Full-frame colour overlay.
    ColourOverlay,
    /// Image overlay.
    ShowImage,
    /// Panel for setting story variables.
    ShowVariablePanel,
    /// Link choice icons.
    ShowLinkChoices,
    /// Social share modal.
    SocialShare,
    /// Outward link modal.
    LinkOut,
    /// Text overlay.
    TextOverlay,
    /// Clickable map overlay.
    MapOverlay,
    /// Fade in from a colour.
    FadeIn,
    /// Fade out to a colour.
    FadeOut,
    /// Fade foreground audio in.
    FadeAudioIn,
    /// Fade foreground audio out.
    FadeAudioOut,
    /// Hold for a number of seconds.
    Pause,
    /// Set story variables.
    ManipulateVariable,
    /// A type with no registered handler.
    Unknown(String),
}

impl BehaviourKind {
    /// Returns the URN for this behaviour type.
    #[must_use]
    pub fn urn(&self) -> String {
        let suffix = match self {
            Self::ColourOverlay => "colouroverlay",
            Self::ShowImage => "showimage",
            Self::ShowVariablePanel => "showvariablepanel",
            Self::ShowLinkChoices => "showlinkchoices",
            Self::SocialShare => "socialmodal",
            Self::LinkOut => "linkoutmodal",
            Self::TextOverlay => "textoverlay",
            Self::MapOverlay => "mapoverlay",
            Self::FadeIn => "fadein",
            Self::FadeOut => "fadeout",
            Self::FadeAudioIn => "fadeaudioin",
            Self::FadeAudioOut => "fadeaudioout",
            Self::Pause => "pause",
            Self::ManipulateVariable => "manipulatevariable",
            Self::Unknown(urn) => return urn.clone(),
        };
        format!("{BEHAVIOUR_TYPE_PREFIX}{suffix}/v1.0")
    }
}

impl From<String> for BehaviourKind {
    fn from(urn: String) -> Self {
        let name = urn
            .strip_prefix(BEHAVIOUR_TYPE_PREFIX)
            .and_then(|rest| rest.strip_suffix("/v1.0"));
        match name {
            Some("colouroverlay") => Self::ColourOverlay,
            Some("showimage") => Self::ShowImage,
            Some("showvariablepanel") => Self::ShowVariablePanel,
            Some("showlinkchoices") => Self::ShowLinkChoices,
            Some("socialmodal") => Self::SocialShare,
            Some("linkoutmodal") => Self::LinkOut,
            Some("textoverlay") => Self::TextOverlay,
            Some("mapoverlay") => Self::MapOverlay,
            Some("fadein") => Self::FadeIn,
            Some("fadeout") => Self::FadeOut,
            Some("fadeaudioin") => Self::FadeAudioIn,
            Some("fadeaudioout") => Self::FadeAudioOut,
            Some("pause") => Self::Pause,
            Some("manipulatevariable") => Self::ManipulateVariable,
            _ => Self::Unknown(urn),
        }
    }
}

impl From<BehaviourKind> for String {
    fn from(kind: BehaviourKind) -> Self {
        kind.urn()
    }
}

/// A single behaviour definition. Type-specific parameters are kept as raw
/// JSON and read through typed accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviourDefinition {
    /// Behaviour identifier.
    pub id: Uuid,
    /// Behaviour type.
    #[serde(rename = "type")]
    pub kind: BehaviourKind,
    /// Remaining type-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl BehaviourDefinition {
    /// Seconds to hold for a pause behaviour; `None` means hold until
    /// released.
    #[must_use]
    pub fn pause_secs(&self) -> Option<f64> {
        let pause = match self.params.get("pause")? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (pause.is_finite() && pause >= 0.0).then_some(pause)
    }

    /// Behaviour asset-collection mapping id of the image to show.
    #[must_use]
    pub fn image_mapping_id(&self) -> Option<Uuid> {
        self.params
            .get("image")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Link choice options, with defaults for anything unspecified.
    #[must_use]
    pub fn link_choice_options(&self) -> LinkChoiceOptions {
        serde_json::from_value(Value::Object(self.params.clone())).unwrap_or_default()
    }

    /// Variable assignments of a manipulate-variable behaviour.
    #[must_use]
    pub fn variable_assignments(&self) -> Vec<VariableAssignment> {
        self.params
            .get("variables")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// Options for a link-choice behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct LinkChoiceOptions {
    /// Keep playing the element to its end after a choice is made.
    pub show_ne_to_end: bool,
    /// Hide the choices once one has been made.
    pub one_shot: bool,
    /// Show choices even when only one link is valid.
    #[serde(rename = "show_if_one_choice")]
    pub show_if_one_link: bool,
    /// Animate a countdown while choosing.
    #[serde(rename = "show_time_remaining")]
    pub countdown: bool,
    /// Disable transport controls while choosing.
    pub disable_controls: bool,
    /// Extra overlay style class.
    #[serde(rename = "overlay_class")]
    pub icon_overlay_class: Option<String>,
    /// Block completion until the user picks a link.
    pub force_choice: bool,
    /// Per-link icon and text overrides.
    pub link_icons: Vec<LinkIcon>,
}

impl Default for LinkChoiceOptions {
    fn default() -> Self {
        Self {
            show_ne_to_end: true,
            one_shot: false,
            show_if_one_link: false,
            countdown: false,
            disable_controls: true,
            icon_overlay_class: None,
            force_choice: false,
            link_icons: Vec::new(),
        }
    }
}

/// Icon/text override for one link target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkIcon {
    /// Link target this icon represents.
    pub target_narrative_element_id: Uuid,
    /// Behaviour asset-collection mapping id of the icon image.
    #[serde(default)]
    pub image: Option<Uuid>,
    /// Icon text.
    #[serde(default)]
    pub text: Option<String>,
}

/// One variable write performed by a manipulate-variable behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableAssignment {
    /// Variable name.
    #[serde(alias = "variable_name")]
    pub variable: String,
    /// New value.
    pub value: Value,
}

/// A behaviour active within a time window of playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuringBehaviour {
    /// Window start, in seconds.
    pub start_time: f64,
    /// Window length, in seconds; open-ended when absent.
    #[serde(default)]
    pub duration: Option<f64>,
    /// The behaviour to run.
    pub behaviour: BehaviourDefinition,
}

impl DuringBehaviour {
    /// Window end, in seconds.
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.duration
            .map_or(f64::INFINITY, |duration| self.start_time + duration)
    }
}

/// Behaviours of a representation, partitioned by phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviourSet {
    /// Run before the main phase.
    #[serde(default)]
    pub started: Vec<BehaviourDefinition>,
    /// Run within time windows of the main phase.
    #[serde(default)]
    pub during: Vec<DuringBehaviour>,
    /// Run when the media completes.
    #[serde(default)]
    pub completed: Vec<BehaviourDefinition>,
}
