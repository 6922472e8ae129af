//! Player configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::PlayerError;

/// Tunable timings for the render core.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Period of the timed-event polling loop.
    pub timer_interval: Duration,
    /// Delay before re-checking a start requested during construction.
    pub start_retry: Duration,
    /// Background audio fade-out length, in seconds.
    pub fade_out_secs: f64,
    /// Seek step for the seek buttons, in seconds.
    pub seek_secs: f64,
    /// Fade between a link being chosen and it being followed.
    pub link_fade: Duration,
    /// How long before a link choice the controls are hidden, in seconds.
    pub control_hide_lead_secs: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            timer_interval: Duration::from_millis(10),
            start_retry: Duration::from_millis(100),
            fade_out_secs: 2.0,
            seek_secs: 10.0,
            link_fade: Duration::from_millis(1500),
            control_hide_lead_secs: 0.4,
        }
    }
}

impl PlayerConfig {
    /// Reads overrides from `STORYPLAYER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Config` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, PlayerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::Config` if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PlayerError> {
        let mut config = Self::default();
        if let Some(ms) = parse_var::<u64>(&lookup, "STORYPLAYER_TIMER_INTERVAL_MS")? {
            if ms == 0 {
                return Err(PlayerError::Config(
                    "STORYPLAYER_TIMER_INTERVAL_MS must be positive".to_owned(),
                ));
            }
            config.timer_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "STORYPLAYER_START_RETRY_MS")? {
            config.start_retry = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<f64>(&lookup, "STORYPLAYER_FADE_OUT_SECS")? {
            config.fade_out_secs = secs;
        }
        if let Some(secs) = parse_var::<f64>(&lookup, "STORYPLAYER_SEEK_SECS")? {
            config.seek_secs = secs;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "STORYPLAYER_LINK_FADE_MS")? {
            config.link_fade = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, PlayerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| PlayerError::Config(format!("{name} must be a valid number: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_without_variables_is_default() {
        let config = PlayerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PlayerConfig::default());
        assert_eq!(config.timer_interval, Duration::from_millis(10));
        assert!((config.fade_out_secs - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_lookup_applies_overrides() {
        let config = PlayerConfig::from_lookup(lookup(&[
            ("STORYPLAYER_TIMER_INTERVAL_MS", "25"),
            ("STORYPLAYER_FADE_OUT_SECS", "3.5"),
            ("STORYPLAYER_LINK_FADE_MS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.timer_interval, Duration::from_millis(25));
        assert!((config.fade_out_secs - 3.5).abs() < f64::EPSILON);
        assert_eq!(config.link_fade, Duration::ZERO);
    }

    #[test]
    fn test_from_lookup_rejects_malformed_values() {
        let result = PlayerConfig::from_lookup(lookup(&[("STORYPLAYER_SEEK_SECS", "ten")]));
        match result {
            Err(PlayerError::Config(message)) => assert!(message.contains("STORYPLAYER_SEEK_SECS")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_lookup_rejects_zero_timer_interval() {
        let result = PlayerConfig::from_lookup(lookup(&[("STORYPLAYER_TIMER_INTERVAL_MS", "0")]));
        assert!(matches!(result, Err(PlayerError::Config(_))));
    }
}
