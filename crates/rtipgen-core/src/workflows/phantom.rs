use crate::core::plan::codec::PlanCodec;
use crate::core::plan::document::BeamSummary;
use crate::engine::error::WorkflowError;
use crate::engine::tools::find_plan_file;
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// The plan-level geometry of a reference phantom.
#[derive(Debug, Clone, PartialEq)]
pub struct PhantomSummary {
    pub plan_path: PathBuf,
    /// Isocenter of the first beam's first control point, in mm.
    pub isocenter: Point3<f64>,
    pub gantry_angle: Option<f64>,
    pub beams: Vec<BeamSummary>,
}

/// Finds the plan document in `dir`, failing with [`WorkflowError::PlanNotFound`].
pub fn locate_plan(dir: &Path, marker: &str) -> Result<PathBuf, WorkflowError> {
    find_plan_file(dir, marker)
        .map_err(WorkflowError::io(dir))?
        .ok_or_else(|| WorkflowError::PlanNotFound {
            dir: dir.to_path_buf(),
            marker: marker.to_string(),
        })
}

#[instrument(skip(codec), name = "phantom_inspection")]
pub fn inspect<C: PlanCodec>(
    dir: &Path,
    marker: &str,
    codec: &C,
) -> Result<PhantomSummary, WorkflowError> {
    let plan_path = locate_plan(dir, marker)?;
    debug!("Reading phantom plan '{}'.", plan_path.display());
    let document = codec.read(&plan_path)?;

    Ok(PhantomSummary {
        isocenter: document.isocenter()?,
        gantry_angle: document.gantry_angle()?,
        beams: document.beam_summaries()?,
        plan_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::document::fixtures::phantom_plan;
    use crate::core::plan::json::DicomJsonCodec;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reports_isocenter_gantry_and_beams() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("CT.1.dcm"), b"ct").unwrap();
        let plan = dir.path().join("phantom_RTIP.json");
        DicomJsonCodec.write(&plan, &phantom_plan()).unwrap();

        let summary = inspect(dir.path(), "RTIP", &DicomJsonCodec).unwrap();

        assert_eq!(summary.plan_path, plan);
        assert_eq!(summary.isocenter, Point3::new(10.0, 20.0, 30.0));
        assert_eq!(summary.gantry_angle, Some(0.0));
        assert_eq!(summary.beams.len(), 2);
    }

    #[test]
    fn directory_without_plan_is_reported() {
        let dir = tempdir().unwrap();
        let result = inspect(dir.path(), "RTIP", &DicomJsonCodec);
        assert!(matches!(result, Err(WorkflowError::PlanNotFound { .. })));

        let missing = inspect(&dir.path().join("absent"), "RTIP", &DicomJsonCodec);
        assert!(matches!(missing, Err(WorkflowError::Io { .. })));
    }
}
