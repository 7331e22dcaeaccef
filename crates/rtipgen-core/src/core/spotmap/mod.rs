//! Spot-map ingestion.
//!
//! A spot map is a headerless, comma-delimited numeric table with one row per
//! delivered spot. [`parser`] turns it into validated [`parser::Spot`] records
//! and [`layers`] groups those spots into energy layers with their summed
//! dose weights.

pub mod layers;
pub mod parser;

use std::path::PathBuf;
use thiserror::Error;

/// A spot map whose retained rows do not have the canonical column count.
///
/// Reported rather than enforced: the designated columns are still extracted
/// when they exist, and callers may proceed after surfacing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Spot map has {found} columns but {expected} are expected. Please check the file format.")]
pub struct ColumnMismatch {
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Error)]
pub enum SpotMapError {
    #[error("Failed to read spot map '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed delimited data on record {record}: {source}")]
    Csv {
        record: u64,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    ColumnCount(#[from] ColumnMismatch),

    #[error("Spot map has only {found} columns; column {column} ({name}) is required")]
    MissingColumn {
        column: usize,
        name: &'static str,
        found: usize,
    },

    #[error("Spot map contains no complete numeric rows")]
    NoValidRows,

    #[error("Cannot group an empty spot sequence into layers")]
    NoSpots,
}
