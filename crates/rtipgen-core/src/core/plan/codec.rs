use super::document::PlanDocument;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error on plan file '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed plan JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid attribute {tag}: {message}")]
    Format { tag: String, message: String },

    #[error("No codec handles plan file '{path}'", path = path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Failed to convert plan file '{path}': {source}", path = path.display())]
    Conversion {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CodecError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io { path, source }
    }
}

/// Reads and writes plan documents in some on-disk encoding.
///
/// The editor and the session workflow only ever see this trait, so the
/// encoding (native JSON, or a binary format reached through converters)
/// is chosen by whoever assembles the pipeline.
pub trait PlanCodec {
    /// Loads the document stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the file cannot be read or decoded.
    fn read(&self, path: &Path) -> Result<PlanDocument, CodecError>;

    /// Stores `document` at `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the document cannot be encoded or written.
    fn write(&self, path: &Path, document: &PlanDocument) -> Result<(), CodecError>;
}

impl<C: PlanCodec + ?Sized> PlanCodec for &C {
    fn read(&self, path: &Path) -> Result<PlanDocument, CodecError> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, document: &PlanDocument) -> Result<(), CodecError> {
        (**self).write(path, document)
    }
}
