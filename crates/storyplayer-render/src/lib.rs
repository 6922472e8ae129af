//! Story Player — render orchestration bounded context.
//!
//! Responsible for the renderer lifecycle, the lookahead cache of
//! neighbouring renderers, background audio crossfades, and the timed
//! events that drive behaviours during playback.

pub mod application;
pub mod domain;
