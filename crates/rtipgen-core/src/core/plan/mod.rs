//! Treatment-plan documents.
//!
//! Plans are handled as generic attribute trees ([`dataset`]) so that content
//! this crate does not understand survives a read-edit-write cycle. [`tags`]
//! names the attributes that are interpreted, [`document`] layers typed
//! navigation over the tree, and [`codec`] / [`json`] move documents to and
//! from disk.

pub mod codec;
pub mod dataset;
pub mod document;
pub mod json;
pub mod tags;
