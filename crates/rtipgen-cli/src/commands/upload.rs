use crate::cli::UploadArgs;
use crate::config::PartialConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use rtipgen::engine::progress::ProgressReporter;
use rtipgen::workflows::upload;
use tracing::{debug, info};

pub fn run(args: UploadArgs, config: &PartialConfig) -> Result<()> {
    let transfer_config = config.transfer_config(args.credentials.as_deref())?;
    debug!("Transfer configuration: {:?}", transfer_config);

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the upload workflow...");
    let mut gateway = upload::command_gateway(&transfer_config);
    let receipt = upload::run(&args.session_dir, &mut gateway, &reporter)?;

    println!(
        "✓ Session '{}' transferred ({} files).",
        receipt.session, receipt.files
    );
    let ingestion = receipt.ingestion_output.trim();
    if !ingestion.is_empty() {
        println!("  Archive ingestion output:\n{}", ingestion);
    }
    Ok(())
}
