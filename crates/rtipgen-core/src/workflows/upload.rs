use crate::engine::config::TransferConfig;
use crate::engine::error::WorkflowError;
use crate::engine::progress::ProgressReporter;
use crate::engine::tools::SystemExecutor;
use crate::engine::transfer::{
    CurlFileTransfer, FileTransfer, OpenSshShell, SecureShell, TransferReceipt,
    TransmissionGateway, is_portable_name,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub type CommandGateway = TransmissionGateway<OpenSshShell<SystemExecutor>, CurlFileTransfer<SystemExecutor>>;

/// Builds a gateway that drives the system `ssh`, `scp` and `curl` binaries.
pub fn command_gateway(config: &TransferConfig) -> CommandGateway {
    TransmissionGateway::new(
        OpenSshShell::new(SystemExecutor, config.pacs.clone(), config.timeout),
        CurlFileTransfer::new(SystemExecutor, config.whiteboard.clone(), config.timeout),
        config,
    )
}

/// Regular files directly inside `dir`, sorted by name.
pub fn session_files(dir: &Path) -> Result<Vec<PathBuf>, WorkflowError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(WorkflowError::io(dir))? {
        let path = entry.map_err(WorkflowError::io(dir))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Uploads every file of the session at `session_dir`; the remote session is
/// named after the directory.
#[instrument(skip_all, name = "upload_workflow", fields(dir = %session_dir.display()))]
pub fn run<S: SecureShell, F: FileTransfer>(
    session_dir: &Path,
    gateway: &mut TransmissionGateway<S, F>,
    reporter: &ProgressReporter,
) -> Result<TransferReceipt, WorkflowError> {
    let session = session_dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            WorkflowError::InvalidArgument(format!(
                "'{}' does not name a session directory",
                session_dir.display()
            ))
        })?;
    if !is_portable_name(session) {
        return Err(WorkflowError::InvalidArgument(format!(
            "Session name '{}' may only contain ASCII letters, digits, '_' and '-'",
            session
        )));
    }
    if !session_dir.is_dir() {
        return Err(WorkflowError::InvalidArgument(format!(
            "Session directory '{}' does not exist",
            session_dir.display()
        )));
    }

    let files = session_files(session_dir)?;
    if files.is_empty() {
        return Err(WorkflowError::InvalidArgument(format!(
            "Session directory '{}' contains no files",
            session_dir.display()
        )));
    }
    info!("Uploading {} files as session '{}'.", files.len(), session);

    Ok(gateway.transmit(session, &files, reporter)?)
}
