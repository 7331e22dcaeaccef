//! # Engine Module
//!
//! Stateful machinery shared by the workflows: configuration and its
//! builders, the error type every workflow returns, progress reporting,
//! external tool invocation, the plan edit transaction and the two-endpoint
//! session transfer.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Tool command templates, session defaults, transfer endpoints
//! - **Error Handling** ([`error`]) - [`error::WorkflowError`] wrapping the per-module errors
//! - **Progress Monitoring** ([`progress`]) - Callback-based phase and file events
//! - **External Tools** ([`tools`], [`convert`]) - Process execution behind [`tools::CommandExecutor`]
//! - **Plan Editing** ([`editor`]) - Geometry substitution applied all-or-nothing
//! - **Transfer** ([`transfer`]) - Step-wise upload to the archive host and review workstation

pub mod config;
pub mod convert;
pub mod editor;
pub mod error;
pub mod progress;
pub mod tools;
pub mod transfer;
