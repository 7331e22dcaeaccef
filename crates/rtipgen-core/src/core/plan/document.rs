use super::dataset::{Dataset, Tag};
use super::tags::{self, display_name};
use nalgebra::Point3;
use thiserror::Error;

/// A required part of the plan document is absent or unusable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanStructureError {
    #[error("Plan document is missing required attribute {path}")]
    Missing { path: String },

    #[error("Sequence {path} has no items")]
    EmptySequence { path: String },

    #[error("Attribute {path} has non-numeric value '{value}'")]
    InvalidNumber { path: String, value: String },

    #[error("Attribute {path} has {found} values, expected {expected}")]
    Multiplicity {
        path: String,
        expected: usize,
        found: usize,
    },
}

/// Builds a readable location such as `IonBeamSequence[0].IonControlPointSequence[0]`.
pub(crate) fn item_path(parent: &str, sequence: Tag, index: usize) -> String {
    let name = format!("{}[{}]", display_name(sequence), index);
    if parent.is_empty() {
        name
    } else {
        format!("{}.{}", parent, name)
    }
}

pub(crate) fn attribute_path(parent: &str, tag: Tag) -> String {
    if parent.is_empty() {
        display_name(tag)
    } else {
        format!("{}.{}", parent, display_name(tag))
    }
}

/// Returns the non-empty item list of `sequence` in `dataset`.
pub(crate) fn required_items<'a>(
    dataset: &'a Dataset,
    sequence: Tag,
    parent: &str,
) -> Result<&'a [Dataset], PlanStructureError> {
    let items = dataset
        .items(sequence)
        .ok_or_else(|| PlanStructureError::Missing {
            path: attribute_path(parent, sequence),
        })?;
    if items.is_empty() {
        return Err(PlanStructureError::EmptySequence {
            path: attribute_path(parent, sequence),
        });
    }
    Ok(items)
}

pub(crate) fn required_items_mut<'a>(
    dataset: &'a mut Dataset,
    sequence: Tag,
    parent: &str,
) -> Result<&'a mut Vec<Dataset>, PlanStructureError> {
    let items = dataset
        .items_mut(sequence)
        .ok_or_else(|| PlanStructureError::Missing {
            path: attribute_path(parent, sequence),
        })?;
    if items.is_empty() {
        return Err(PlanStructureError::EmptySequence {
            path: attribute_path(parent, sequence),
        });
    }
    Ok(items)
}

/// Parses the first value of `tag` as a number; `Ok(None)` when absent.
pub(crate) fn optional_number(
    dataset: &Dataset,
    tag: Tag,
    parent: &str,
) -> Result<Option<f64>, PlanStructureError> {
    match dataset.string(tag) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PlanStructureError::InvalidNumber {
                path: attribute_path(parent, tag),
                value: raw.to_string(),
            }),
    }
}

pub(crate) fn required_number(
    dataset: &Dataset,
    tag: Tag,
    parent: &str,
) -> Result<f64, PlanStructureError> {
    optional_number(dataset, tag, parent)?.ok_or_else(|| PlanStructureError::Missing {
        path: attribute_path(parent, tag),
    })
}

/// First control point of the beam at `beam_index`.
pub fn first_control_point(
    beam: &Dataset,
    beam_index: usize,
) -> Result<&Dataset, PlanStructureError> {
    let parent = item_path("", tags::ION_BEAM_SEQUENCE, beam_index);
    Ok(&required_items(beam, tags::ION_CONTROL_POINT_SEQUENCE, &parent)?[0])
}

pub fn first_control_point_mut(
    beam: &mut Dataset,
    beam_index: usize,
) -> Result<&mut Dataset, PlanStructureError> {
    let parent = item_path("", tags::ION_BEAM_SEQUENCE, beam_index);
    Ok(&mut required_items_mut(beam, tags::ION_CONTROL_POINT_SEQUENCE, &parent)?[0])
}

/// Per-beam facts reported when inspecting a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSummary {
    pub number: Option<String>,
    pub name: Option<String>,
    pub delivery_type: Option<String>,
    pub control_points: usize,
    /// Distinct nominal energies over the control points, in order of appearance.
    pub nominal_energies: Vec<f64>,
}

/// An ion treatment plan held as a hierarchical dataset.
///
/// Only the beams, their control points, the fraction groups and a handful of
/// plan-level labels are interpreted; everything else travels untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanDocument {
    dataset: Dataset,
}

impl PlanDocument {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    pub fn beams(&self) -> Result<&[Dataset], PlanStructureError> {
        required_items(&self.dataset, tags::ION_BEAM_SEQUENCE, "")
    }

    pub fn beams_mut(&mut self) -> Result<&mut Vec<Dataset>, PlanStructureError> {
        required_items_mut(&mut self.dataset, tags::ION_BEAM_SEQUENCE, "")
    }

    pub fn fraction_groups(&self) -> Result<&[Dataset], PlanStructureError> {
        required_items(&self.dataset, tags::FRACTION_GROUP_SEQUENCE, "")
    }

    pub fn fraction_groups_mut(&mut self) -> Result<&mut Vec<Dataset>, PlanStructureError> {
        required_items_mut(&mut self.dataset, tags::FRACTION_GROUP_SEQUENCE, "")
    }

    /// Isocenter of the first control point of the first beam, in mm.
    pub fn isocenter(&self) -> Result<Point3<f64>, PlanStructureError> {
        let control_point = first_control_point(&self.beams()?[0], 0)?;
        let parent = item_path(
            &item_path("", tags::ION_BEAM_SEQUENCE, 0),
            tags::ION_CONTROL_POINT_SEQUENCE,
            0,
        );
        let path = attribute_path(&parent, tags::ISOCENTER_POSITION);

        let values = control_point
            .strings(tags::ISOCENTER_POSITION)
            .ok_or_else(|| PlanStructureError::Missing { path: path.clone() })?;
        if values.len() != 3 {
            return Err(PlanStructureError::Multiplicity {
                path,
                expected: 3,
                found: values.len(),
            });
        }

        let mut coords = [0.0; 3];
        for (coord, raw) in coords.iter_mut().zip(values) {
            *coord = raw
                .trim()
                .parse()
                .map_err(|_| PlanStructureError::InvalidNumber {
                    path: path.clone(),
                    value: raw.clone(),
                })?;
        }
        Ok(Point3::new(coords[0], coords[1], coords[2]))
    }

    /// Gantry angle of the first control point of the first beam, if set.
    pub fn gantry_angle(&self) -> Result<Option<f64>, PlanStructureError> {
        let control_point = first_control_point(&self.beams()?[0], 0)?;
        let parent = item_path(
            &item_path("", tags::ION_BEAM_SEQUENCE, 0),
            tags::ION_CONTROL_POINT_SEQUENCE,
            0,
        );
        optional_number(control_point, tags::GANTRY_ANGLE, &parent)
    }

    pub fn beam_summaries(&self) -> Result<Vec<BeamSummary>, PlanStructureError> {
        self.beams()?
            .iter()
            .enumerate()
            .map(|(index, beam)| {
                let beam_path = item_path("", tags::ION_BEAM_SEQUENCE, index);
                let control_points = beam
                    .items(tags::ION_CONTROL_POINT_SEQUENCE)
                    .unwrap_or_default();

                let mut nominal_energies: Vec<f64> = Vec::new();
                for (cp_index, control_point) in control_points.iter().enumerate() {
                    let cp_path =
                        item_path(&beam_path, tags::ION_CONTROL_POINT_SEQUENCE, cp_index);
                    if let Some(energy) =
                        optional_number(control_point, tags::NOMINAL_BEAM_ENERGY, &cp_path)?
                    {
                        if !nominal_energies.contains(&energy) {
                            nominal_energies.push(energy);
                        }
                    }
                }

                Ok(BeamSummary {
                    number: beam.string(tags::BEAM_NUMBER).map(str::to_string),
                    name: beam.string(tags::BEAM_NAME).map(str::to_string),
                    delivery_type: beam
                        .string(tags::TREATMENT_DELIVERY_TYPE)
                        .map(str::to_string),
                    control_points: control_points.len(),
                    nominal_energies,
                })
            })
            .collect()
    }
}

impl From<Dataset> for PlanDocument {
    fn from(dataset: Dataset) -> Self {
        Self::new(dataset)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::core::plan::dataset::Vr;

    pub fn control_point(energy: &str, iso: [&str; 3], gantry: &str) -> Dataset {
        let mut cp = Dataset::new();
        cp.put_str(tags::NOMINAL_BEAM_ENERGY, Vr::DS, energy);
        cp.put_strings(
            tags::ISOCENTER_POSITION,
            Vr::DS,
            iso.iter().map(|s| s.to_string()).collect(),
        );
        cp.put_str(tags::GANTRY_ANGLE, Vr::DS, gantry);
        cp.put_str(tags::PATIENT_SUPPORT_ANGLE, Vr::DS, "0");
        cp
    }

    pub fn beam(number: &str, control_points: Vec<Dataset>) -> Dataset {
        let mut beam = Dataset::new();
        beam.put_str(tags::BEAM_NUMBER, Vr::IS, number);
        beam.put_str(tags::BEAM_NAME, Vr::LO, format!("Beam {}", number));
        beam.put_str(tags::TREATMENT_DELIVERY_TYPE, Vr::CS, "TREATMENT");
        beam.put_items(tags::ION_CONTROL_POINT_SEQUENCE, control_points);
        beam
    }

    pub fn fraction_group(number: &str, beams: usize) -> Dataset {
        let mut group = Dataset::new();
        group.put_str(tags::FRACTION_GROUP_NUMBER, Vr::IS, number);
        group.put_str(tags::NUMBER_OF_BEAMS, Vr::IS, beams.to_string());
        group
    }

    /// Two treatment beams at 120 MeV, gantry 0 and 90, isocenter (10, 20, 30).
    pub fn phantom_plan() -> PlanDocument {
        let mut ds = Dataset::new();
        ds.put_str(tags::RT_PLAN_LABEL, Vr::SH, "Phantom");
        ds.put_str(tags::RT_PLAN_NAME, Vr::LO, "Water phantom");
        ds.put_str(tags::RT_PLAN_GEOMETRY, Vr::CS, "TREATMENT_DEVICE");
        ds.put_items(tags::FRACTION_GROUP_SEQUENCE, vec![fraction_group("7", 2)]);
        ds.put_items(
            tags::ION_BEAM_SEQUENCE,
            vec![
                beam(
                    "1",
                    vec![
                        control_point("120", ["10", "20", "30"], "0"),
                        control_point("115", ["10", "20", "30"], "0"),
                    ],
                ),
                beam("2", vec![control_point("120", ["10", "20", "30"], "90")]),
            ],
        );
        PlanDocument::new(ds)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::core::plan::dataset::Vr;

    #[test]
    fn isocenter_and_gantry_come_from_first_beam() {
        let plan = phantom_plan();
        assert_eq!(plan.isocenter().unwrap(), Point3::new(10.0, 20.0, 30.0));
        assert_eq!(plan.gantry_angle().unwrap(), Some(0.0));
    }

    #[test]
    fn missing_beam_sequence_is_a_structural_error() {
        let plan = PlanDocument::new(Dataset::new());
        assert_eq!(
            plan.beams(),
            Err(PlanStructureError::Missing {
                path: "IonBeamSequence".into()
            })
        );
    }

    #[test]
    fn empty_control_point_sequence_is_reported_with_its_path() {
        let mut plan = phantom_plan();
        plan.beams_mut().unwrap()[0].put_items(tags::ION_CONTROL_POINT_SEQUENCE, vec![]);
        assert_eq!(
            plan.isocenter(),
            Err(PlanStructureError::EmptySequence {
                path: "IonBeamSequence[0].IonControlPointSequence".into()
            })
        );
    }

    #[test]
    fn malformed_isocenter_is_rejected() {
        let mut plan = phantom_plan();
        let cp = first_control_point_mut(&mut plan.beams_mut().unwrap()[0], 0).unwrap();
        cp.put_strings(tags::ISOCENTER_POSITION, Vr::DS, vec!["1".into(), "2".into()]);
        assert!(matches!(
            plan.isocenter(),
            Err(PlanStructureError::Multiplicity { found: 2, .. })
        ));

        let cp = first_control_point_mut(&mut plan.beams_mut().unwrap()[0], 0).unwrap();
        cp.put_strings(
            tags::ISOCENTER_POSITION,
            Vr::DS,
            vec!["1".into(), "x".into(), "3".into()],
        );
        assert!(matches!(
            plan.isocenter(),
            Err(PlanStructureError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn beam_summaries_collect_distinct_energies() {
        let summaries = phantom_plan().beam_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].number.as_deref(), Some("1"));
        assert_eq!(summaries[0].control_points, 2);
        assert_eq!(summaries[0].nominal_energies, vec![120.0, 115.0]);
        assert_eq!(summaries[1].delivery_type.as_deref(), Some("TREATMENT"));
    }
}
