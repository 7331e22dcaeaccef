use crate::cli::EstimateArgs;
use crate::error::Result;
use crate::report;
use crate::utils::progress::CliProgressHandler;
use rtipgen::core::physics::bragg::BufferLength;
use rtipgen::core::spotmap::layers::LayerGrouping;
use rtipgen::engine::progress::ProgressReporter;
use rtipgen::workflows::dose::{self, DoseEstimateConfig};
use tracing::info;

fn estimate_config(args: &EstimateArgs) -> DoseEstimateConfig {
    DoseEstimateConfig {
        grouping: if args.group_by_energy {
            LayerGrouping::ByEnergy
        } else {
            LayerGrouping::ContiguousRuns
        },
        buffer: if args.full_range {
            BufferLength::Longest
        } else {
            BufferLength::default()
        },
        ..Default::default()
    }
}

pub fn run(args: EstimateArgs) -> Result<()> {
    let config = estimate_config(&args);
    let report_path = args.report.then(|| report::report_path(&args.spot_map));

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    info!("Invoking the dose estimation workflow...");
    let estimate = dose::estimate_file(&args.spot_map, &config, &reporter)?;

    if let Some(mismatch) = &estimate.column_warning {
        println!("Warning: {}", mismatch);
    }
    print!("{}", report::render_estimate(&estimate));

    if let Some(path) = report_path {
        report::write_report(&path, &estimate.aggregation.summary)?;
        println!("✓ Summary written to: {}", path.display());
    }
    if let Some(path) = &args.curve {
        report::write_curve_csv(path, &estimate.curve)?;
        println!("✓ Depth-dose curves written to: {}", path.display());
    }
    Ok(())
}
