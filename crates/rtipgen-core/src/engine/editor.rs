use super::error::WorkflowError;
use crate::core::plan::codec::PlanCodec;
use crate::core::plan::dataset::{Dataset, Vr};
use crate::core::plan::document::{
    PlanDocument, PlanStructureError, attribute_path, first_control_point, first_control_point_mut,
    item_path, required_items, required_number,
};
use crate::core::plan::tags;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub const PLAN_LABEL: &str = "label";
pub const PLAN_NAME: &str = "name";
pub const PLAN_GEOMETRY: &str = "PATIENT";
pub const SETUP_DELIVERY_TYPE: &str = "SETUP";
pub const SETUP_SUPPORT_ANGLE: &str = "90";

const DS_MAX_LEN: usize = 16;

/// Formats `value` as a decimal string of at most 16 characters.
pub fn ds_string(value: f64) -> String {
    let plain = value.to_string();
    if plain.len() <= DS_MAX_LEN {
        return plain;
    }
    for precision in (0..DS_MAX_LEN).rev() {
        let fixed = format!("{:.*}", precision, value);
        let fixed = if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        };
        if fixed.len() <= DS_MAX_LEN {
            return fixed;
        }
    }
    (0..DS_MAX_LEN)
        .rev()
        .map(|precision| format!("{:.*e}", precision, value))
        .find(|s| s.len() <= DS_MAX_LEN)
        .unwrap_or_else(|| format!("{:e}", value))
}

/// Fraction-group and beam sequences taken from another plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamReplacement {
    pub fraction_groups: Vec<Dataset>,
    pub beams: Vec<Dataset>,
}

impl BeamReplacement {
    /// Copies both sequences out of `document`; both must be present and non-empty.
    pub fn from_document(document: &PlanDocument) -> Result<Self, PlanStructureError> {
        Ok(Self {
            fraction_groups: document.fraction_groups()?.to_vec(),
            beams: document.beams()?.to_vec(),
        })
    }

    /// Turns the first beam into a setup beam.
    pub fn mark_setup_beam(&mut self) -> Result<(), PlanStructureError> {
        mark_setup_beam(&mut self.beams)
    }
}

/// Tags the first beam as a setup beam with the couch rotated to 90 degrees.
pub fn mark_setup_beam(beams: &mut [Dataset]) -> Result<(), PlanStructureError> {
    let beam = beams
        .first_mut()
        .ok_or_else(|| PlanStructureError::EmptySequence {
            path: attribute_path("", tags::ION_BEAM_SEQUENCE),
        })?;
    beam.put_str(tags::TREATMENT_DELIVERY_TYPE, Vr::CS, SETUP_DELIVERY_TYPE);
    first_control_point_mut(beam, 0)?.put_str(
        tags::PATIENT_SUPPORT_ANGLE,
        Vr::DS,
        SETUP_SUPPORT_ANGLE,
    );
    Ok(())
}

/// The substitutions applied to a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryEdit {
    /// Isocenter in mm; only applied when all three coordinates are present.
    pub position: [Option<f64>; 3],
    pub gantry_angle: Option<f64>,
    pub replacement: Option<BeamReplacement>,
}

impl GeometryEdit {
    fn complete_position(&self) -> Option<[f64; 3]> {
        match self.position {
            [Some(x), Some(y), Some(z)] => Some([x, y, z]),
            _ => None,
        }
    }
}

/// What an edit changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditReport {
    pub beam_count: usize,
    pub isocenter_applied: bool,
    pub gantry_applied: bool,
    pub sequences_replaced: bool,
    pub setup_beam_marked: bool,
    /// `(declared, actual)` when FractionGroup[0].NumberOfBeams disagrees with the beam count.
    pub beam_count_mismatch: Option<(u64, usize)>,
}

/// Applies `edit` to `document`.
///
/// The edit runs on a copy; `document` is only updated when every rule
/// succeeds, so a structural error leaves it as it was.
pub fn apply_geometry(
    document: &mut PlanDocument,
    edit: &GeometryEdit,
) -> Result<EditReport, PlanStructureError> {
    let mut working = document.clone();
    let report = apply_rules(&mut working, edit)?;
    *document = working;
    Ok(report)
}

fn apply_rules(
    document: &mut PlanDocument,
    edit: &GeometryEdit,
) -> Result<EditReport, PlanStructureError> {
    let mut report = EditReport::default();

    if let Some(position) = edit.complete_position() {
        let values: Vec<String> = position.iter().map(|&c| ds_string(c)).collect();
        for (index, beam) in document.beams_mut()?.iter_mut().enumerate() {
            first_control_point_mut(beam, index)?.put_strings(
                tags::ISOCENTER_POSITION,
                Vr::DS,
                values.clone(),
            );
        }
        report.isocenter_applied = true;
    }

    if let Some(angle) = edit.gantry_angle {
        let value = ds_string(angle);
        for (index, beam) in document.beams_mut()?.iter_mut().enumerate() {
            first_control_point_mut(beam, index)?.put_str(tags::GANTRY_ANGLE, Vr::DS, value.clone());
        }
        report.gantry_applied = true;
    }

    if let Some(replacement) = &edit.replacement {
        let dataset = document.dataset_mut();
        dataset.put_items(
            tags::FRACTION_GROUP_SEQUENCE,
            replacement.fraction_groups.clone(),
        );
        dataset.put_items(tags::ION_BEAM_SEQUENCE, replacement.beams.clone());
        report.sequences_replaced = true;
    }

    let dataset = document.dataset_mut();
    dataset.put_str(tags::RT_PLAN_LABEL, Vr::SH, PLAN_LABEL);
    dataset.put_str(tags::RT_PLAN_NAME, Vr::LO, PLAN_NAME);
    dataset.put_str(tags::RT_PLAN_GEOMETRY, Vr::CS, PLAN_GEOMETRY);
    document.fraction_groups_mut()?[0].put_str(tags::FRACTION_GROUP_NUMBER, Vr::IS, "1");

    let beams = document.beams_mut()?;
    let cp_path = item_path(
        &item_path("", tags::ION_BEAM_SEQUENCE, 0),
        tags::ION_CONTROL_POINT_SEQUENCE,
        0,
    );
    let nominal_energy = required_number(
        first_control_point(&beams[0], 0)?,
        tags::NOMINAL_BEAM_ENERGY,
        &cp_path,
    )?;
    if nominal_energy == 0.0 {
        mark_setup_beam(beams)?;
        report.setup_beam_marked = true;
    }

    report.beam_count = beams.len();
    report.beam_count_mismatch = check_beam_count(document, report.beam_count)?;
    Ok(report)
}

fn check_beam_count(
    document: &PlanDocument,
    beam_count: usize,
) -> Result<Option<(u64, usize)>, PlanStructureError> {
    let group = &required_items(document.dataset(), tags::FRACTION_GROUP_SEQUENCE, "")?[0];
    let declared = group
        .string(tags::NUMBER_OF_BEAMS)
        .and_then(|raw| raw.trim().parse::<u64>().ok());

    Ok(match declared {
        Some(declared) if declared != beam_count as u64 => {
            warn!(
                "FractionGroupSequence[0] declares {} beams but the plan has {}.",
                declared, beam_count
            );
            Some((declared, beam_count))
        }
        _ => None,
    })
}

/// Loads a plan through a codec, applies a [`GeometryEdit`] and writes it back.
pub struct PlanDocumentEditor<C> {
    codec: C,
}

impl<C: PlanCodec> PlanDocumentEditor<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Edits the plan stored at `path` in place.
    ///
    /// Nothing is written unless every substitution succeeds.
    #[instrument(skip_all, name = "plan_edit", fields(path = %path.display()))]
    pub fn edit_file(&self, path: &Path, edit: &GeometryEdit) -> Result<EditReport, WorkflowError> {
        let mut document = self.codec.read(path)?;
        let report = apply_geometry(&mut document, edit)?;
        debug!("Edit report: {:?}", report);
        self.codec.write(path, &document)?;
        info!(
            "Updated plan '{}' ({} beams).",
            path.display(),
            report.beam_count
        );
        Ok(report)
    }
}
