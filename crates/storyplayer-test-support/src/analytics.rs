//! Recording analytics sink.

use std::sync::Mutex;

use storyplayer_core::analytics::{AnalyticsEventName, AnalyticsLogger, AnalyticsPayload};

/// An analytics logger that keeps every payload it receives.
#[derive(Debug, Default)]
pub struct RecordingAnalytics {
    payloads: Mutex<Vec<AnalyticsPayload>>,
}

impl RecordingAnalytics {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every payload logged so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn payloads(&self) -> Vec<AnalyticsPayload> {
        self.payloads.lock().unwrap().clone()
    }

    /// Returns the event names logged so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn names(&self) -> Vec<AnalyticsEventName> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .map(|payload| payload.name)
            .collect()
    }
}

impl AnalyticsLogger for RecordingAnalytics {
    fn log(&self, payload: AnalyticsPayload) {
        self.payloads.lock().unwrap().push(payload);
    }
}
