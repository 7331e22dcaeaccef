use crate::cli::SessionArgs;
use crate::error::{CliError, Result};
use directories::ProjectDirs;
use rtipgen::engine::config::{
    self as core_config, CommandTemplate, Endpoint, SessionConfig, SessionConfigBuilder,
    ToolsConfig, TransferConfig, TransferConfigBuilder,
};
use rtipgen::engine::convert::ConvertingCodec;
use rtipgen::engine::tools::SystemExecutor;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "rtipgen.toml";

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialCommand {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

impl From<PartialCommand> for CommandTemplate {
    fn from(p: PartialCommand) -> Self {
        CommandTemplate::new(p.program, p.args)
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialToolsConfig {
    plan_generator: Option<PartialCommand>,
    dataset_cloner: Option<PartialCommand>,
    dicom_to_json: Option<PartialCommand>,
    json_to_dicom: Option<PartialCommand>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialSessionConfig {
    output_root: Option<PathBuf>,
    birth_date: Option<String>,
    sex: Option<String>,
    plan_marker: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialEndpoint {
    address: Option<String>,
    username: Option<String>,
    password: Option<String>,
    port: Option<u16>,
}

impl PartialEndpoint {
    fn build(self, section: &str) -> Result<Endpoint> {
        let missing = |key: &str| {
            CliError::Config(format!(
                "`transfer.{}.{}` is required unless a credentials file is given.",
                section, key
            ))
        };
        Ok(Endpoint {
            address: self.address.ok_or_else(|| missing("address"))?,
            username: self.username.ok_or_else(|| missing("username"))?,
            password: self.password,
            port: self.port,
        })
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialTransferConfig {
    pacs: Option<PartialEndpoint>,
    whiteboard: Option<PartialEndpoint>,
    credentials_file: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    remote_sessions_dir: Option<String>,
    ingestion_script: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    tools: Option<PartialToolsConfig>,
    session: Option<PartialSessionConfig>,
    transfer: Option<PartialTransferConfig>,
}

/// `rtipgen.toml` in the platform configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "proton-qa", "rtipgen")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl PartialConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads the explicitly requested file, or the default file when it
    /// exists, or falls back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                debug!("No configuration file found; using defaults.");
                Ok(Self::default())
            }
        }
    }

    /// External tool commands; relative script paths that exist under `base`
    /// are made absolute so the tools can run from scratch directories.
    pub fn tools(&self, base: &Path) -> ToolsConfig {
        let partial = self.tools.clone().unwrap_or_default();
        let defaults = ToolsConfig::default();
        ToolsConfig {
            plan_generator: partial
                .plan_generator
                .map_or(defaults.plan_generator, Into::into),
            dataset_cloner: partial
                .dataset_cloner
                .map_or(defaults.dataset_cloner, Into::into),
            dicom_to_json: partial.dicom_to_json.map_or(defaults.dicom_to_json, Into::into),
            json_to_dicom: partial.json_to_dicom.map_or(defaults.json_to_dicom, Into::into),
        }
        .resolve_relative(base)
    }

    /// Codec reading `.json` plans directly and `.dcm` plans through the
    /// configured converters.
    pub fn codec(&self, base: &Path) -> ConvertingCodec<SystemExecutor> {
        let tools = self.tools(base);
        ConvertingCodec::new(SystemExecutor, tools.dicom_to_json, tools.json_to_dicom)
    }

    pub fn plan_marker(&self) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.plan_marker.clone())
            .unwrap_or_else(|| core_config::DEFAULT_PLAN_MARKER.to_string())
    }

    pub fn session_config(&self, args: &SessionArgs, base: &Path) -> Result<SessionConfig> {
        let partial = self.session.clone().unwrap_or_default();
        let output_root = args
            .output
            .clone()
            .or(partial.output_root)
            .unwrap_or_else(|| base.to_path_buf());

        let mut builder = SessionConfigBuilder::new()
            .output_root(output_root)
            .tools(self.tools(base));
        if let Some(date) = partial.birth_date {
            builder = builder.birth_date(date);
        }
        if let Some(sex) = partial.sex {
            builder = builder.sex(sex);
        }
        if let Some(marker) = partial.plan_marker {
            builder = builder.plan_marker(marker);
        }
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    /// Endpoints come from `credentials` when given, then from the file's
    /// `transfer.credentials-file`, then from the `[transfer.*]` sections.
    pub fn transfer_config(&self, credentials: Option<&Path>) -> Result<TransferConfig> {
        let partial = self.transfer.clone().unwrap_or_default();

        let credentials = credentials
            .map(Path::to_path_buf)
            .or_else(|| partial.credentials_file.clone());
        let (pacs, whiteboard) = match credentials {
            Some(path) => {
                debug!("Reading transfer credentials from {:?}", path);
                let text = std::fs::read_to_string(&path)?;
                core_config::parse_credentials(&text).map_err(|e| CliError::FileParsing {
                    path,
                    source: e.into(),
                })?
            }
            None => (
                partial.pacs.unwrap_or_default().build("pacs")?,
                partial.whiteboard.unwrap_or_default().build("whiteboard")?,
            ),
        };

        let mut builder = TransferConfigBuilder::new().pacs(pacs).whiteboard(whiteboard);
        if let Some(seconds) = partial.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        if let Some(dir) = partial.remote_sessions_dir {
            builder = builder.remote_sessions_dir(dir);
        }
        if let Some(script) = partial.ingestion_script {
            builder = builder.ingestion_script(script);
        }
        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }
}
