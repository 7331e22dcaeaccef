use super::config::{Endpoint, TransferConfig};
use super::progress::{Progress, ProgressReporter};
use super::tools::{CommandExecutor, Invocation};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;
pub type TransportResult<T = ()> = Result<T, TransportError>;

/// Unanswered keepalives before `ssh`/`scp` gives up on the archive host.
const SERVER_ALIVE_COUNT_MAX: u64 = 3;

/// The stages of a session transfer, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStep {
    ConnectShell,
    CreateRemoteDirectory,
    UploadFiles,
    TriggerIngestion,
    ConnectFileTransfer,
    CreateTransferDirectory,
    TransmitFiles,
}

impl TransferStep {
    pub const ALL: [TransferStep; 7] = [
        Self::ConnectShell,
        Self::CreateRemoteDirectory,
        Self::UploadFiles,
        Self::TriggerIngestion,
        Self::ConnectFileTransfer,
        Self::CreateTransferDirectory,
        Self::TransmitFiles,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectShell => "connect to archive host",
            Self::CreateRemoteDirectory => "create remote session directory",
            Self::UploadFiles => "upload session files",
            Self::TriggerIngestion => "trigger archive ingestion",
            Self::ConnectFileTransfer => "connect to review workstation",
            Self::CreateTransferDirectory => "create workstation directory",
            Self::TransmitFiles => "transmit session files",
        }
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A transfer stopped at `step`; later steps were not attempted.
#[derive(Debug, Error)]
#[error("Transfer failed at step '{step}': {reason}")]
pub struct TransferError {
    pub step: TransferStep,
    pub reason: String,
}

/// Whether `name` can travel unquoted through remote shells, file paths and
/// FTP commands: ASCII letters, digits, `_` and `-`, not starting with `-`.
pub fn is_portable_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Quotes `word` for a POSIX shell. Words made only of unambiguous
/// characters are returned unchanged.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./=:,+@%".contains(&b));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// `path` as a remote shell argument, keeping a leading `~/` expandable.
fn remote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None => shell_quote(path),
    }
}

/// The session directory for the ingestion script. Relative directories
/// are resolved against the remote home.
fn remote_session_dir(sessions: &str, session: &str) -> String {
    let dir = format!("{}/{}", sessions, session);
    if dir.starts_with('/') || dir.starts_with("~/") {
        remote_path(&dir)
    } else {
        remote_path(&format!("~/{}", dir))
    }
}

/// Remote shell plus secure copy to the archive host.
pub trait SecureShell {
    fn connect(&mut self) -> TransportResult;
    /// Runs `command` remotely and returns its standard output.
    fn execute(&mut self, command: &str) -> TransportResult<String>;
    fn upload(&mut self, local: &Path, remote: &str) -> TransportResult;
    fn close(&mut self) {}
}

/// Login, directory creation and binary upload to the review workstation.
pub trait FileTransfer {
    fn connect(&mut self) -> TransportResult;
    fn make_directory(&mut self, dir: &str) -> TransportResult;
    fn store(&mut self, local: &Path, remote: &str) -> TransportResult;
    fn quit(&mut self) {}
}

/// `ssh`/`scp` driven through a [`CommandExecutor`]; passwords go through
/// `sshpass -e` so they never appear on the command line.
pub struct OpenSshShell<E> {
    executor: E,
    endpoint: Endpoint,
    timeout: Duration,
}

impl<E: CommandExecutor> OpenSshShell<E> {
    pub fn new(executor: E, endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            executor,
            endpoint,
            timeout,
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.endpoint.username, self.endpoint.address)
    }

    fn invocation(&self, program: &str, port_flag: &str) -> Invocation {
        let mut invocation = match &self.endpoint.password {
            Some(password) => Invocation::new("sshpass")
                .args(["-e", program])
                .env("SSHPASS", password.clone()),
            None => Invocation::new(program).args(["-o", "BatchMode=yes"]),
        };
        // Keepalives bound how long a silent peer can stall a command.
        let secs = self.timeout.as_secs().max(1);
        invocation = invocation.args([
            "-o".to_string(),
            format!("ConnectTimeout={}", secs),
            "-o".to_string(),
            format!("ServerAliveInterval={}", (secs / SERVER_ALIVE_COUNT_MAX).max(1)),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", SERVER_ALIVE_COUNT_MAX),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]);
        if let Some(port) = self.endpoint.port {
            invocation = invocation.args([port_flag.to_string(), port.to_string()]);
        }
        invocation
    }

    fn ssh(&self, command: &str) -> TransportResult<String> {
        let invocation = self
            .invocation("ssh", "-p")
            .args([self.destination(), command.to_string()]);
        Ok(self.executor.run(&invocation)?.stdout)
    }
}

impl<E: CommandExecutor> SecureShell for OpenSshShell<E> {
    fn connect(&mut self) -> TransportResult {
        self.ssh("true").map(|_| ())
    }

    fn execute(&mut self, command: &str) -> TransportResult<String> {
        self.ssh(command)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> TransportResult {
        let invocation = self.invocation("scp", "-P").args([
            local.to_string_lossy().into_owned(),
            format!("{}:{}", self.destination(), remote),
        ]);
        self.executor.run(&invocation)?;
        Ok(())
    }
}

/// Plain FTP through `curl`, one process per operation.
pub struct CurlFileTransfer<E> {
    executor: E,
    endpoint: Endpoint,
    timeout: Duration,
}

impl<E: CommandExecutor> CurlFileTransfer<E> {
    pub fn new(executor: E, endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            executor,
            endpoint,
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        let port = self.endpoint.port.map_or_else(String::new, |p| format!(":{}", p));
        format!("ftp://{}{}/{}", self.endpoint.address, port, path)
    }

    fn curl(&self) -> Invocation {
        let secs = self.timeout.as_secs().max(1).to_string();
        let user = format!(
            "{}:{}",
            self.endpoint.username,
            self.endpoint.password.as_deref().unwrap_or_default()
        );
        Invocation::new("curl").args([
            "--silent".to_string(),
            "--show-error".to_string(),
            "--connect-timeout".to_string(),
            secs.clone(),
            "--max-time".to_string(),
            secs,
            "--user".to_string(),
            user,
        ])
    }
}

impl<E: CommandExecutor> FileTransfer for CurlFileTransfer<E> {
    fn connect(&mut self) -> TransportResult {
        let invocation = self.curl().args(["--list-only".to_string(), self.url("")]);
        self.executor.run(&invocation)?;
        Ok(())
    }

    fn make_directory(&mut self, dir: &str) -> TransportResult {
        let invocation = self
            .curl()
            .args(["--quote".to_string(), format!("MKD {}", dir), self.url("")]);
        self.executor.run(&invocation)?;
        Ok(())
    }

    fn store(&mut self, local: &Path, remote: &str) -> TransportResult {
        let invocation = self.curl().args([
            "--upload-file".to_string(),
            local.to_string_lossy().into_owned(),
            self.url(remote),
        ]);
        self.executor.run(&invocation)?;
        Ok(())
    }
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub session: String,
    pub files: usize,
    /// Standard output of the ingestion script.
    pub ingestion_output: String,
}

/// Sends a session to the archive host and then to the review workstation.
pub struct TransmissionGateway<S, F> {
    shell: S,
    file_transfer: F,
    remote_sessions_dir: String,
    ingestion_script: String,
}

impl<S: SecureShell, F: FileTransfer> TransmissionGateway<S, F> {
    pub fn new(shell: S, file_transfer: F, config: &TransferConfig) -> Self {
        Self {
            shell,
            file_transfer,
            remote_sessions_dir: config.remote_sessions_dir.clone(),
            ingestion_script: config.ingestion_script.clone(),
        }
    }

    /// Transfers `files` as session `session`.
    ///
    /// Steps run in [`TransferStep::ALL`] order. The first failing step ends
    /// the transfer and is named in the returned error. A session name that
    /// is not [portable](is_portable_name) is refused before connecting.
    #[instrument(skip_all, name = "transfer", fields(session = %session))]
    pub fn transmit(
        &mut self,
        session: &str,
        files: &[PathBuf],
        progress: &ProgressReporter,
    ) -> Result<TransferReceipt, TransferError> {
        if !is_portable_name(session) {
            return Err(TransferError {
                step: TransferStep::CreateRemoteDirectory,
                reason: format!(
                    "session name '{}' may only contain ASCII letters, digits, '_' and '-'",
                    session
                ),
            });
        }
        let sessions = self.remote_sessions_dir.clone();

        run_step(progress, TransferStep::ConnectShell, || self.shell.connect())?;
        info!("Connected to archive host.");

        run_step(progress, TransferStep::CreateRemoteDirectory, || {
            self.shell
                .execute(&format!(
                    "cd {}; mkdir -p {}",
                    remote_path(&sessions),
                    shell_quote(session)
                ))
                .map(|_| ())
        })?;

        run_step(progress, TransferStep::UploadFiles, || {
            upload_each(progress, files, |local, name| {
                self.shell
                    .upload(local, &format!("{}/{}/{}", sessions, session, name))
            })
        })?;

        let script = format!(
            "{} {}",
            self.ingestion_script,
            remote_session_dir(&sessions, session)
        );
        let ingestion_output =
            run_step(progress, TransferStep::TriggerIngestion, || self.shell.execute(&script))?;
        debug!("Ingestion output: {}", ingestion_output.trim_end());
        self.shell.close();

        run_step(progress, TransferStep::ConnectFileTransfer, || {
            self.file_transfer.connect()
        })?;
        run_step(progress, TransferStep::CreateTransferDirectory, || {
            self.file_transfer.make_directory(session)
        })?;
        run_step(progress, TransferStep::TransmitFiles, || {
            upload_each(progress, files, |local, name| {
                self.file_transfer
                    .store(local, &format!("{}/{}", session, name))
            })
        })?;
        self.file_transfer.quit();

        info!("Transferred {} files for session '{}'.", files.len(), session);
        Ok(TransferReceipt {
            session: session.to_string(),
            files: files.len(),
            ingestion_output,
        })
    }
}

fn run_step<T>(
    progress: &ProgressReporter,
    step: TransferStep,
    action: impl FnOnce() -> TransportResult<T>,
) -> Result<T, TransferError> {
    progress
        .phase(step.label(), action)
        .map_err(|error| TransferError {
            step,
            reason: error.to_string(),
        })
}

fn upload_each(
    progress: &ProgressReporter,
    files: &[PathBuf],
    mut send: impl FnMut(&Path, &str) -> TransportResult,
) -> TransportResult {
    progress.report(Progress::FilesStart {
        total: files.len() as u64,
    });
    for local in files {
        let name = local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| format!("'{}' has no file name", local.display()))?;
        send(local, &name)?;
        progress.report(Progress::FileDone { name });
    }
    progress.report(Progress::FilesFinish);
    Ok(())
}
