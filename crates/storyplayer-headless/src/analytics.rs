//! Analytics sink that writes every payload to the log.

use storyplayer_core::analytics::{AnalyticsLogger, AnalyticsPayload};
use tracing::info;

/// Logs analytics payloads under the `analytics` target.
#[derive(Debug, Default)]
pub struct TracingAnalytics;

impl AnalyticsLogger for TracingAnalytics {
    fn log(&self, payload: AnalyticsPayload) {
        info!(
            target: "analytics",
            event_type = ?payload.event_type,
            name = ?payload.name,
            from = payload.from.as_deref().unwrap_or_default(),
            to = payload.to.as_deref().unwrap_or_default(),
            "analytics event"
        );
    }
}
