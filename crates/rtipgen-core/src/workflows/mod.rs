//! High-level procedures combining the core models with the engine.
//!
//! Each workflow takes a [`ProgressReporter`](crate::engine::progress::ProgressReporter)
//! so callers can surface phase and per-file progress.

pub mod dose;
pub mod phantom;
pub mod session;
pub mod upload;
