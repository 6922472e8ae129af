//! Time-windowed callbacks keyed by listener id.
//!
//! Each entry fires its start callback once when the playback position
//! enters `[start_time, end_time]` and its clear callback once when the
//! position leaves it. Seeks are handled by comparing against the window on
//! every poll rather than by tracking crossings.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use storyplayer_core::error::PlayerError;
use tracing::warn;
use uuid::Uuid;

/// Callback run when a timed event enters or leaves its window.
pub type TimedCallback = Arc<dyn Fn() -> Result<(), PlayerError> + Send + Sync>;

/// A registered timed event.
pub struct TimedEvent {
    /// Window start in seconds.
    pub start_time: f64,
    /// Window end in seconds; infinite when open-ended.
    pub end_time: f64,
    start_callback: TimedCallback,
    clear_callback: Option<TimedCallback>,
    is_running: bool,
}

impl TimedEvent {
    /// Whether the start callback has fired without a matching clear.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    fn contains(&self, position: f64) -> bool {
        position >= self.start_time && position <= self.end_time
    }
}

impl fmt::Debug for TimedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedEvent")
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("has_clear_callback", &self.clear_callback.is_some())
            .field("is_running", &self.is_running)
            .finish()
    }
}

/// A callback due to run, collected while the service is locked and invoked
/// after it is released.
pub enum TimedInvocation {
    /// The position entered the window.
    Start {
        /// Listener that fired.
        listener_id: String,
        /// Callback to run.
        callback: TimedCallback,
    },
    /// The position left the window.
    Clear {
        /// Listener that fired.
        listener_id: String,
        /// Callback to run, if one was registered.
        callback: Option<TimedCallback>,
    },
}

impl TimedInvocation {
    /// Runs the callback. Start failures and clear failures are logged and
    /// swallowed so that one misbehaving listener cannot stall the loop.
    pub fn invoke(self, renderer_id: Uuid) {
        match self {
            Self::Start {
                listener_id,
                callback,
            } => {
                if let Err(error) = callback() {
                    warn!(%renderer_id, %listener_id, %error, "timed event start callback failed");
                }
            }
            Self::Clear {
                listener_id,
                callback: Some(callback),
            } => {
                if let Err(error) = callback() {
                    warn!(%renderer_id, %listener_id, %error, "could not clear behaviour");
                }
            }
            Self::Clear { callback: None, .. } => {}
        }
    }
}

/// Registry of timed events for one renderer.
#[derive(Debug, Default)]
pub struct TimedEventService {
    events: BTreeMap<String, TimedEvent>,
}

impl TimedEventService {
    /// Registers (or replaces) a timed event. A missing end time means the
    /// window stays open until the media ends.
    pub fn add(
        &mut self,
        listener_id: impl Into<String>,
        start_time: f64,
        start_callback: TimedCallback,
        end_time: Option<f64>,
        clear_callback: Option<TimedCallback>,
    ) {
        self.events.insert(
            listener_id.into(),
            TimedEvent {
                start_time,
                end_time: end_time.unwrap_or(f64::INFINITY),
                start_callback,
                clear_callback,
                is_running: false,
            },
        );
    }

    /// Removes a timed event. Returns `false` when none was registered.
    pub fn remove(&mut self, listener_id: &str) -> bool {
        self.events.remove(listener_id).is_some()
    }

    /// Looks up a timed event.
    #[must_use]
    pub fn get(&self, listener_id: &str) -> Option<&TimedEvent> {
        self.events.get(listener_id)
    }

    /// Number of registered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every event without running callbacks.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Compares every window against `position`, flips running flags, and
    /// returns the callbacks that are now due.
    pub fn due(&mut self, position: f64) -> Vec<TimedInvocation> {
        let mut due = Vec::new();
        for (listener_id, event) in &mut self.events {
            let inside = event.contains(position);
            if inside && !event.is_running {
                event.is_running = true;
                due.push(TimedInvocation::Start {
                    listener_id: listener_id.clone(),
                    callback: Arc::clone(&event.start_callback),
                });
            } else if !inside && event.is_running {
                event.is_running = false;
                due.push(TimedInvocation::Clear {
                    listener_id: listener_id.clone(),
                    callback: event.clear_callback.clone(),
                });
            }
        }
        due
    }
}
