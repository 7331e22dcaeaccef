use crate::core::physics::bragg::{BraggCurveComposer, BufferLength, CompositeBraggCurve};
use crate::core::physics::stopping::EnergyLossModel;
use crate::core::spotmap::ColumnMismatch;
use crate::core::spotmap::layers::{DoseAggregator, LayerAggregation, LayerGrouping};
use crate::core::spotmap::parser::SpotMap;
use crate::engine::error::WorkflowError;
use crate::engine::progress::ProgressReporter;
use std::path::Path;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DoseEstimateConfig {
    pub grouping: LayerGrouping,
    pub buffer: BufferLength,
    pub model: EnergyLossModel,
}

#[derive(Debug, Clone)]
pub struct DoseEstimate {
    pub spot_map: SpotMap,
    pub aggregation: LayerAggregation,
    pub curve: CompositeBraggCurve,
    /// Set when the spot map does not have the canonical column count.
    /// The estimate is still computed from the designated columns.
    pub column_warning: Option<ColumnMismatch>,
}

/// Parses the spot map at `path` and estimates its dose.
pub fn estimate_file(
    path: &Path,
    config: &DoseEstimateConfig,
    reporter: &ProgressReporter,
) -> Result<DoseEstimate, WorkflowError> {
    let spot_map = reporter.phase("Parsing spot map", || SpotMap::from_path(path))?;
    run(spot_map, config, reporter)
}

#[instrument(skip_all, name = "dose_workflow", fields(spots = spot_map.len()))]
pub fn run(
    spot_map: SpotMap,
    config: &DoseEstimateConfig,
    reporter: &ProgressReporter,
) -> Result<DoseEstimate, WorkflowError> {
    let column_warning = spot_map.check_columns().err();
    if let Some(mismatch) = &column_warning {
        warn!("Continuing despite column mismatch: {}", mismatch);
    }

    let aggregation = reporter.phase("Aggregating layers", || {
        DoseAggregator::new(config.grouping).aggregate(spot_map.spots())
    })?;

    let curve = reporter.phase("Composing Bragg curve", || {
        BraggCurveComposer::new(config.buffer).compose(&aggregation.layers, &config.model)
    })?;

    info!(
        "Estimated dose for {} spots in {} layers (total weight {:.4}).",
        aggregation.summary.spot_count,
        aggregation.summary.layer_count,
        aggregation.summary.total_weight
    );

    Ok(DoseEstimate {
        spot_map,
        aggregation,
        curve,
        column_warning,
    })
}
