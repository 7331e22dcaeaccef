use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "rtipgen - proton therapy QA tooling: spot-map dose estimates, phantom QA sessions and session transfer.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to the configuration file in TOML format.
    /// Defaults to `rtipgen.toml` in the user configuration directory.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that a spot map has the expected column layout.
    Check(CheckArgs),
    /// Estimate layer doses and the composite Bragg curve of a spot map.
    Estimate(EstimateArgs),
    /// Show the plan geometry and beams of a phantom dataset.
    Phantom(PhantomArgs),
    /// Create a QA session by cloning a phantom and rewriting its plan.
    Session(SessionArgs),
    /// Send a session directory to the archive host and the review workstation.
    Upload(UploadArgs),
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the spot-map file (comma-separated, no header).
    #[arg(value_name = "SPOTMAP")]
    pub spot_map: PathBuf,
}

/// Arguments for the `estimate` subcommand.
#[derive(Args, Debug)]
pub struct EstimateArgs {
    #[arg(value_name = "SPOTMAP")]
    pub spot_map: PathBuf,

    /// Write the dose summary to `<SPOTMAP>.txt` next to the spot map.
    #[arg(long)]
    pub report: bool,

    /// Export the composite and per-layer depth-dose curves as CSV.
    #[arg(long, value_name = "PATH")]
    pub curve: Option<PathBuf>,

    /// Group equal energies into one layer wherever they appear in the file.
    #[arg(long)]
    pub group_by_energy: bool,

    /// Size the composite curve to the longest layer profile instead of the
    /// default 50 cm window.
    #[arg(long)]
    pub full_range: bool,
}

/// Arguments for the `phantom` subcommand.
#[derive(Args, Debug)]
pub struct PhantomArgs {
    #[arg(value_name = "PHANTOM_DIR")]
    pub phantom_dir: PathBuf,
}

/// Arguments for the `session` subcommand.
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Directory holding the reference phantom dataset.
    #[arg(long, required = true, value_name = "DIR")]
    pub phantom: PathBuf,

    /// Patient first name.
    #[arg(long, required = true, value_name = "NAME")]
    pub first: String,

    /// Patient last name.
    #[arg(long, required = true, value_name = "NAME")]
    pub last: String,

    /// Spot map whose generated beams replace the phantom's beams.
    #[arg(long, value_name = "CSV")]
    pub spot_map: Option<PathBuf>,

    /// Turn the first generated beam into a setup beam.
    #[arg(long, requires = "spot_map")]
    pub setup_beam: bool,

    /// Isocenter position in mm. The phantom isocenter is kept when neither
    /// this nor `--gantry` is given.
    #[arg(
        long,
        num_args = 3,
        value_names = ["X", "Y", "Z"],
        allow_negative_numbers = true
    )]
    pub isocenter: Option<Vec<f64>>,

    /// Gantry angle in degrees.
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    pub gantry: Option<f64>,

    /// Root directory under which the session directory is created,
    /// overriding `session.output-root` from the config file.
    #[arg(short, long, value_name = "ROOT")]
    pub output: Option<PathBuf>,
}

/// Arguments for the `upload` subcommand.
#[derive(Args, Debug)]
pub struct UploadArgs {
    #[arg(value_name = "SESSION_DIR")]
    pub session_dir: PathBuf,

    /// Two-line credentials file: `address user password` for the archive
    /// host, then `address user password port` for the review workstation.
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,
}
