//! Domain model for the render context.

pub mod background;
pub mod behaviours;
pub mod events;
pub mod phase;
pub mod renderer;
pub mod timed_events;
