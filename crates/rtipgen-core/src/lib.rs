//! # rtipgen Core Library
//!
//! Dose estimation and treatment-plan session generation for proton therapy
//! quality assurance. A clinical spot map is turned into per-layer dose
//! aggregates and an approximate composite Bragg curve, and a reference
//! phantom dataset is cloned into a new session whose ion plan carries the
//! requested geometry and beams.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models and pure algorithms:
//!   the energy-loss model and Bragg curve composition (`physics`), spot-map
//!   parsing and layer aggregation (`spotmap`), and the hierarchical plan
//!   dataset with its codecs (`plan`).
//!
//! - **[`engine`]: The Logic Core.** Configuration, errors, progress reporting,
//!   the transactional plan editor, external tool invocation and the
//!   transmission gateway.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built from the two
//!   layers below: dose estimation, phantom inspection, session creation and
//!   session upload.

pub mod core;
pub mod engine;
pub mod workflows;
