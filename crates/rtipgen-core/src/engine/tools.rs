use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' failed with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatusText,
        stderr: String,
    },

    #[error("'{program}' did not produce {expected} in '{dir}'", dir = dir.display())]
    MissingOutput {
        program: String,
        expected: String,
        dir: PathBuf,
    },
}

/// Exit status as reported in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatusText {
    Code(i32),
    Signal,
}

impl fmt::Display for ExitStatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Signal => f.write_str("termination by signal"),
        }
    }
}

/// A fully rendered external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined for log output. Environment values are
    /// never included.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs on behalf of the workflows.
pub trait CommandExecutor {
    /// Runs `invocation` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Spawn`] if the program cannot be started and
    /// [`ToolError::Failed`] if it exits unsuccessfully.
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        (**self).run(invocation)
    }
}

/// Executes invocations as child processes of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        debug!("Running: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let output = command.output().map_err(|source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        trace!("'{}' stdout: {}", invocation.program, stdout.trim_end());

        if output.status.success() {
            return Ok(ToolOutput { stdout, stderr });
        }

        let status = output
            .status
            .code()
            .map_or(ExitStatusText::Signal, ExitStatusText::Code);
        Err(ToolError::Failed {
            program: invocation.program.clone(),
            status,
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Locates the plan document inside `dir`.
///
/// The plan is the first file, by name, whose name contains `marker` and
/// ends in `.dcm` (any case) or `.json`.
pub fn find_plan_file(dir: &Path, marker: &str) -> io::Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| is_plan_file_name(name, marker))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn is_plan_file_name(name: &str, marker: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    name.contains(marker) && (lower.ends_with(".dcm") || lower.ends_with(".json"))
}
