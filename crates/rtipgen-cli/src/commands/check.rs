use crate::cli::CheckArgs;
use crate::error::{CliError, Result};
use rtipgen::core::spotmap::parser::SpotMap;
use rtipgen::engine::error::WorkflowError;
use tracing::{info, warn};

pub fn run(args: CheckArgs) -> Result<()> {
    info!("Checking spot map {:?}", &args.spot_map);
    let spot_map = SpotMap::from_path(&args.spot_map)
        .map_err(|e| CliError::Workflow(WorkflowError::from(e)))?;

    if spot_map.check_columns().is_err() {
        warn!("Spot map {:?} does not have the expected layout.", &args.spot_map);
    }
    println!("{}", spot_map.check_message());
    if spot_map.dropped_rows() > 0 {
        println!(
            "  {} row(s) with missing or non-numeric values were skipped.",
            spot_map.dropped_rows()
        );
    }
    Ok(())
}
