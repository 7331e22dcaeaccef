use thiserror::Error;

use super::config::ConfigError;
use super::tools::ToolError;
use super::transfer::TransferError;
use crate::core::physics::PhysicsError;
use crate::core::plan::codec::CodecError;
use crate::core::plan::document::PlanStructureError;
use crate::core::spotmap::SpotMapError;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Spot map error: {source}")]
    SpotMap {
        #[from]
        source: SpotMapError,
    },

    #[error("Dose estimation failed: {source}")]
    Physics {
        #[from]
        source: PhysicsError,
    },

    #[error("Plan document I/O failed: {source}")]
    Codec {
        #[from]
        source: CodecError,
    },

    #[error("Plan document is malformed: {source}")]
    PlanStructure {
        #[from]
        source: PlanStructureError,
    },

    #[error("External tool failed: {source}")]
    Tool {
        #[from]
        source: ToolError,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Session directory '{path}' already exists", path = path.display())]
    SessionExists { path: PathBuf },

    #[error("No plan document containing '{marker}' found in '{dir}'", dir = dir.display())]
    PlanNotFound { dir: PathBuf, marker: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkflowError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io { path, source }
    }
}
