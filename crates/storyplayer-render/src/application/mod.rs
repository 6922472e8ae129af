//! Application layer for the render context.

pub mod crossfade;
pub mod lookahead;
pub mod render_manager;
pub mod session_state;
