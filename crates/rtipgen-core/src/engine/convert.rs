use super::config::CommandTemplate;
use super::tools::{CommandExecutor, ToolError};
use crate::core::plan::codec::{CodecError, PlanCodec};
use crate::core::plan::document::PlanDocument;
use crate::core::plan::json::DicomJsonCodec;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

const SCRATCH_JSON: &str = "plan.json";
const SCRATCH_DICOM: &str = "plan.dcm";

/// Reads and writes binary plan files by converting them to and from the
/// JSON model with external converters. JSON files are handled directly.
#[derive(Debug, Clone)]
pub struct ConvertingCodec<E> {
    executor: E,
    to_json: CommandTemplate,
    to_dicom: CommandTemplate,
}

impl<E: CommandExecutor> ConvertingCodec<E> {
    pub fn new(executor: E, to_json: CommandTemplate, to_dicom: CommandTemplate) -> Self {
        Self {
            executor,
            to_json,
            to_dicom,
        }
    }

    fn scratch(&self, path: &Path) -> Result<TempDir, CodecError> {
        tempfile::tempdir().map_err(CodecError::io(path))
    }

    fn convert(
        &self,
        template: &CommandTemplate,
        input: &Path,
        output: &Path,
        source: &Path,
    ) -> Result<(), CodecError> {
        let invocation = template.render(&[
            ("input", &*input.to_string_lossy()),
            ("output", &*output.to_string_lossy()),
        ]);
        let conversion_error = |error: ToolError| CodecError::Conversion {
            path: source.to_path_buf(),
            source: Box::new(error),
        };

        self.executor.run(&invocation).map_err(conversion_error)?;
        if !output.is_file() {
            return Err(conversion_error(ToolError::MissingOutput {
                program: invocation.program,
                expected: output.file_name().map_or_else(String::new, |name| {
                    name.to_string_lossy().into_owned()
                }),
                dir: output.parent().unwrap_or(Path::new("")).to_path_buf(),
            }));
        }
        Ok(())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

impl<E: CommandExecutor> PlanCodec for ConvertingCodec<E> {
    fn read(&self, path: &Path) -> Result<PlanDocument, CodecError> {
        match extension(path).as_deref() {
            Some("json") => DicomJsonCodec.read(path),
            Some("dcm") => {
                let scratch = self.scratch(path)?;
                let json = scratch.path().join(SCRATCH_JSON);
                debug!("Converting '{}' to JSON for reading.", path.display());
                self.convert(&self.to_json, path, &json, path)?;
                DicomJsonCodec.read(&json)
            }
            _ => Err(CodecError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// The target file is only replaced once conversion has succeeded.
    fn write(&self, path: &Path, document: &PlanDocument) -> Result<(), CodecError> {
        match extension(path).as_deref() {
            Some("json") => DicomJsonCodec.write(path, document),
            Some("dcm") => {
                let scratch = self.scratch(path)?;
                let json = scratch.path().join(SCRATCH_JSON);
                let dicom = scratch.path().join(SCRATCH_DICOM);
                DicomJsonCodec.write(&json, document)?;
                debug!("Converting edited plan back to '{}'.", path.display());
                self.convert(&self.to_dicom, &json, &dicom, path)?;
                fs::copy(&dicom, path).map_err(CodecError::io(path))?;
                Ok(())
            }
            _ => Err(CodecError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}
