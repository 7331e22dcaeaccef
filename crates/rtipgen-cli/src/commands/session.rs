use crate::cli::SessionArgs;
use crate::config::PartialConfig;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use rtipgen::engine::progress::ProgressReporter;
use rtipgen::engine::tools::SystemExecutor;
use rtipgen::workflows::session::{SessionCloner, SessionRequest};
use tracing::{debug, info};

fn build_request(args: &SessionArgs) -> Result<SessionRequest> {
    let position = match args.isocenter.as_deref() {
        None => [None; 3],
        Some(&[x, y, z]) => [Some(x), Some(y), Some(z)],
        Some(values) => {
            return Err(CliError::Argument(format!(
                "--isocenter takes exactly three values, got {}",
                values.len()
            )));
        }
    };
    Ok(SessionRequest {
        phantom_dir: args.phantom.clone(),
        first_name: args.first.clone(),
        last_name: args.last.clone(),
        spot_map: args.spot_map.clone(),
        setup_beam: args.setup_beam,
        position,
        gantry_angle: args.gantry,
    })
}

pub fn run(args: SessionArgs, config: &PartialConfig) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let session_config = config.session_config(&args, &cwd)?;
    debug!("Session configuration: {:?}", session_config);
    let request = build_request(&args)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the session workflow...");
    let cloner = SessionCloner::new(&session_config, SystemExecutor, config.codec(&cwd));
    let handle = cloner.create_session(&request, &mut rand::thread_rng(), &reporter)?;

    println!("✓ Session '{}' created in: {}", handle.name, handle.directory.display());
    println!(
        "  Patient {} (ID {}), plan {}",
        handle.patient.name,
        handle.patient.id,
        handle.plan_path.display()
    );
    println!("  {} beam(s) in the edited plan.", handle.edit.beam_count);
    if handle.edit.setup_beam_marked {
        println!("  First beam has zero energy and was marked as a setup beam.");
    }
    if let Some((declared, actual)) = handle.edit.beam_count_mismatch {
        println!(
            "Warning: fraction group declares {} beams but the plan has {}.",
            declared, actual
        );
    }
    Ok(())
}
