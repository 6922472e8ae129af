//! Per-session state shared by the render manager and crossfade scheduler.

use std::collections::BTreeMap;

/// User choices that outlive any single renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    last_switchable_label: Option<String>,
    volumes: BTreeMap<String, f64>,
}

impl SessionState {
    /// Label of the switchable choice picked most recently.
    #[must_use]
    pub fn last_switchable_label(&self) -> Option<&str> {
        self.last_switchable_label.as_deref()
    }

    /// Records a switchable choice and returns the one it replaces.
    pub fn set_switchable_label(&mut self, label: impl Into<String>) -> Option<String> {
        self.last_switchable_label.replace(label.into())
    }

    /// Records the volume chosen for a labelled channel.
    pub fn set_volume(&mut self, label: impl Into<String>, value: f64) {
        self.volumes.insert(label.into(), value.clamp(0.0, 1.0));
    }

    /// Volume chosen for a labelled channel.
    #[must_use]
    pub fn volume(&self, label: &str) -> Option<f64> {
        self.volumes.get(label).copied()
    }

    /// Every persisted volume, by label.
    pub fn volumes(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.volumes
            .iter()
            .map(|(label, value)| (label.as_str(), *value))
    }
}
