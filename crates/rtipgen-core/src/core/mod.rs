//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! - **Physics** ([`physics`]) - Proton energy loss versus depth and composite Bragg curves
//! - **Spot Maps** ([`spotmap`]) - Parsing of delivery spot tables and grouping into energy layers
//! - **Plan Documents** ([`plan`]) - Hierarchical plan datasets, tag dictionary and codecs
//!
//! Nothing in this module performs process invocation or network access; the
//! only I/O is reading spot maps and reading or writing plan files.

pub mod physics;
pub mod plan;
pub mod spotmap;
