//! Story Player Headless — walks a story document through the render core.
//!
//! The document supplies every fetcher answer, a walking controller picks
//! the first valid link (or the link the user chose), and a simulated
//! playout clock stands in for real media.

pub mod analytics;
pub mod controller;
pub mod document;
pub mod driver;
pub mod error;
pub mod playout;
