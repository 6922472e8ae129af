//! Story Player Core — shared data model and collaborator contracts.
//!
//! This crate defines the narrative/representation data model, the error
//! taxonomy, and the traits the render orchestration consumes (controller,
//! fetchers, reasoner, player boundary, analytics). It contains no
//! orchestration logic.

pub mod analytics;
pub mod behaviour;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetchers;
pub mod model;
pub mod player;
