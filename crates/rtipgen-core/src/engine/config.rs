use super::tools::Invocation;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Credentials line {line} is malformed: expected '{expected}'")]
    MalformedCredentials { line: usize, expected: &'static str },

    #[error("Invalid port '{0}' in credentials")]
    InvalidPort(String),
}

pub const DEFAULT_BIRTH_DATE: &str = "19830104";
pub const DEFAULT_PATIENT_SEX: &str = "F";
pub const DEFAULT_PLAN_MARKER: &str = "RTIP";
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REMOTE_SESSIONS_DIR: &str = "sessions";
pub const DEFAULT_INGESTION_SCRIPT: &str = "./upload_session_data_to_pacs.sh";

/// An external program with an argument template.
///
/// Arguments may contain `{input}`, `{output}` and `{attributes}`, which are
/// substituted when the template is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Substitutes `{name}` placeholders; unknown placeholders are left as is.
    pub fn render(&self, bindings: &[(&str, &str)]) -> Invocation {
        let args = self.args.iter().map(|arg| {
            bindings
                .iter()
                .fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{}}}", name), value)
                })
        });
        Invocation::new(self.program.clone()).args(args)
    }

    /// Makes relative program and argument paths absolute when they name an
    /// existing file under `base`, so the command can run from any directory.
    pub fn resolve_relative(mut self, base: &Path) -> Self {
        let resolve = |value: &mut String| {
            if value.contains('{') || Path::new(value.as_str()).is_absolute() {
                return;
            }
            let candidate = base.join(value.as_str());
            if candidate.is_file() {
                *value = candidate.to_string_lossy().into_owned();
            }
        };
        resolve(&mut self.program);
        self.args.iter_mut().for_each(resolve);
        self
    }
}

/// The external programs the workflows delegate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    /// Converts a spot map into a plan document in its working directory.
    pub plan_generator: CommandTemplate,
    /// Clones a phantom dataset into a session directory with new patient attributes.
    pub dataset_cloner: CommandTemplate,
    pub dicom_to_json: CommandTemplate,
    pub json_to_dicom: CommandTemplate,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            plan_generator: CommandTemplate::new("python", ["csv2xml_Clinical_py36.py", "{input}"]),
            dataset_cloner: CommandTemplate::new(
                "python",
                [
                    "cpydcm2_36_mkp.py",
                    "-i",
                    "{input}",
                    "-o",
                    "{output}",
                    "-cconv",
                    "-attr",
                    "{attributes}",
                ],
            ),
            dicom_to_json: CommandTemplate::new("dcm2json", ["{input}", "{output}"]),
            json_to_dicom: CommandTemplate::new("json2dcm", ["{input}", "{output}"]),
        }
    }
}

impl ToolsConfig {
    pub fn resolve_relative(self, base: &Path) -> Self {
        Self {
            plan_generator: self.plan_generator.resolve_relative(base),
            dataset_cloner: self.dataset_cloner.resolve_relative(base),
            dicom_to_json: self.dicom_to_json.resolve_relative(base),
            json_to_dicom: self.json_to_dicom.resolve_relative(base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientDefaults {
    /// `YYYYMMDD`.
    pub birth_date: String,
    pub sex: String,
}

impl Default for PatientDefaults {
    fn default() -> Self {
        Self {
            birth_date: DEFAULT_BIRTH_DATE.to_string(),
            sex: DEFAULT_PATIENT_SEX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub output_root: PathBuf,
    pub patient: PatientDefaults,
    pub plan_marker: String,
    pub tools: ToolsConfig,
}

#[derive(Default)]
pub struct SessionConfigBuilder {
    output_root: Option<PathBuf>,
    birth_date: Option<String>,
    sex: Option<String>,
    plan_marker: Option<String>,
    tools: Option<ToolsConfig>,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_root(mut self, path: PathBuf) -> Self {
        self.output_root = Some(path);
        self
    }
    pub fn birth_date(mut self, date: String) -> Self {
        self.birth_date = Some(date);
        self
    }
    pub fn sex(mut self, sex: String) -> Self {
        self.sex = Some(sex);
        self
    }
    pub fn plan_marker(mut self, marker: String) -> Self {
        self.plan_marker = Some(marker);
        self
    }
    pub fn tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let defaults = PatientDefaults::default();
        Ok(SessionConfig {
            output_root: self
                .output_root
                .ok_or(ConfigError::MissingParameter("output_root"))?,
            patient: PatientDefaults {
                birth_date: self.birth_date.unwrap_or(defaults.birth_date),
                sex: self.sex.unwrap_or(defaults.sex),
            },
            plan_marker: self
                .plan_marker
                .unwrap_or_else(|| DEFAULT_PLAN_MARKER.to_string()),
            tools: self.tools.unwrap_or_default(),
        })
    }
}

/// Address and login of a remote host.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub username: String,
    pub password: Option<String>,
    pub port: Option<u16>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    /// Archive host reached over the secure shell.
    pub pacs: Endpoint,
    /// Review workstation reached over plain file transfer.
    pub whiteboard: Endpoint,
    pub timeout: Duration,
    pub remote_sessions_dir: String,
    pub ingestion_script: String,
}

#[derive(Default)]
pub struct TransferConfigBuilder {
    pacs: Option<Endpoint>,
    whiteboard: Option<Endpoint>,
    timeout: Option<Duration>,
    remote_sessions_dir: Option<String>,
    ingestion_script: Option<String>,
}

impl TransferConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pacs(mut self, endpoint: Endpoint) -> Self {
        self.pacs = Some(endpoint);
        self
    }
    pub fn whiteboard(mut self, endpoint: Endpoint) -> Self {
        self.whiteboard = Some(endpoint);
        self
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn remote_sessions_dir(mut self, dir: String) -> Self {
        self.remote_sessions_dir = Some(dir);
        self
    }
    pub fn ingestion_script(mut self, script: String) -> Self {
        self.ingestion_script = Some(script);
        self
    }

    pub fn build(self) -> Result<TransferConfig, ConfigError> {
        Ok(TransferConfig {
            pacs: self.pacs.ok_or(ConfigError::MissingParameter("pacs"))?,
            whiteboard: self
                .whiteboard
                .ok_or(ConfigError::MissingParameter("whiteboard"))?,
            timeout: self.timeout.unwrap_or(DEFAULT_TRANSFER_TIMEOUT),
            remote_sessions_dir: self
                .remote_sessions_dir
                .unwrap_or_else(|| DEFAULT_REMOTE_SESSIONS_DIR.to_string()),
            ingestion_script: self
                .ingestion_script
                .unwrap_or_else(|| DEFAULT_INGESTION_SCRIPT.to_string()),
        })
    }
}

/// Parses the two-line credentials format.
///
/// Line one is `address user password` for the archive host, line two is
/// `address user password port` for the review workstation.
pub fn parse_credentials(text: &str) -> Result<(Endpoint, Endpoint), ConfigError> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let pacs_fields: Vec<&str> = lines.next().unwrap_or_default().split_whitespace().collect();
    let [address, username, password, ..] = pacs_fields[..] else {
        return Err(ConfigError::MalformedCredentials {
            line: 1,
            expected: "address user password",
        });
    };
    let pacs = Endpoint {
        address: address.to_string(),
        username: username.to_string(),
        password: Some(password.to_string()),
        port: None,
    };

    let wb_fields: Vec<&str> = lines.next().unwrap_or_default().split_whitespace().collect();
    let [address, username, password, port, ..] = wb_fields[..] else {
        return Err(ConfigError::MalformedCredentials {
            line: 2,
            expected: "address user password port",
        });
    };
    let port = port
        .parse()
        .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
    let whiteboard = Endpoint {
        address: address.to_string(),
        username: username.to_string(),
        password: Some(password.to_string()),
        port: Some(port),
    };

    Ok((pacs, whiteboard))
}
