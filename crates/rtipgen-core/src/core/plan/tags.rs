//! The subset of the radiotherapy ion plan dictionary this crate reads or writes.

use super::dataset::{Tag, Vr};
use phf::{Map, phf_map};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub tag: Tag,
    pub vr: Vr,
}

pub const PATIENT_NAME: Tag = Tag::new(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);
pub const PATIENT_BIRTH_DATE: Tag = Tag::new(0x0010, 0x0030);
pub const PATIENT_SEX: Tag = Tag::new(0x0010, 0x0040);

pub const RT_PLAN_LABEL: Tag = Tag::new(0x300A, 0x0002);
pub const RT_PLAN_NAME: Tag = Tag::new(0x300A, 0x0003);
pub const RT_PLAN_GEOMETRY: Tag = Tag::new(0x300A, 0x000C);
pub const FRACTION_GROUP_SEQUENCE: Tag = Tag::new(0x300A, 0x0070);
pub const FRACTION_GROUP_NUMBER: Tag = Tag::new(0x300A, 0x0071);
pub const NUMBER_OF_BEAMS: Tag = Tag::new(0x300A, 0x0080);
pub const BEAM_NUMBER: Tag = Tag::new(0x300A, 0x00C0);
pub const BEAM_NAME: Tag = Tag::new(0x300A, 0x00C2);
pub const TREATMENT_DELIVERY_TYPE: Tag = Tag::new(0x300A, 0x00CE);
pub const NOMINAL_BEAM_ENERGY: Tag = Tag::new(0x300A, 0x0114);
pub const GANTRY_ANGLE: Tag = Tag::new(0x300A, 0x011E);
pub const PATIENT_SUPPORT_ANGLE: Tag = Tag::new(0x300A, 0x0122);
pub const ISOCENTER_POSITION: Tag = Tag::new(0x300A, 0x012C);
pub const ION_BEAM_SEQUENCE: Tag = Tag::new(0x300A, 0x03A2);
pub const ION_CONTROL_POINT_SEQUENCE: Tag = Tag::new(0x300A, 0x03A8);

static DICTIONARY: Map<&'static str, DictionaryEntry> = phf_map! {
    "PatientName" => DictionaryEntry { tag: PATIENT_NAME, vr: Vr::PN },
    "PatientID" => DictionaryEntry { tag: PATIENT_ID, vr: Vr::LO },
    "PatientBirthDate" => DictionaryEntry { tag: PATIENT_BIRTH_DATE, vr: Vr::DA },
    "PatientSex" => DictionaryEntry { tag: PATIENT_SEX, vr: Vr::CS },
    "RTPlanLabel" => DictionaryEntry { tag: RT_PLAN_LABEL, vr: Vr::SH },
    "RTPlanName" => DictionaryEntry { tag: RT_PLAN_NAME, vr: Vr::LO },
    "RTPlanGeometry" => DictionaryEntry { tag: RT_PLAN_GEOMETRY, vr: Vr::CS },
    "FractionGroupSequence" => DictionaryEntry { tag: FRACTION_GROUP_SEQUENCE, vr: Vr::SQ },
    "FractionGroupNumber" => DictionaryEntry { tag: FRACTION_GROUP_NUMBER, vr: Vr::IS },
    "NumberOfBeams" => DictionaryEntry { tag: NUMBER_OF_BEAMS, vr: Vr::IS },
    "BeamNumber" => DictionaryEntry { tag: BEAM_NUMBER, vr: Vr::IS },
    "BeamName" => DictionaryEntry { tag: BEAM_NAME, vr: Vr::LO },
    "TreatmentDeliveryType" => DictionaryEntry { tag: TREATMENT_DELIVERY_TYPE, vr: Vr::CS },
    "NominalBeamEnergy" => DictionaryEntry { tag: NOMINAL_BEAM_ENERGY, vr: Vr::DS },
    "GantryAngle" => DictionaryEntry { tag: GANTRY_ANGLE, vr: Vr::DS },
    "PatientSupportAngle" => DictionaryEntry { tag: PATIENT_SUPPORT_ANGLE, vr: Vr::DS },
    "IsocenterPosition" => DictionaryEntry { tag: ISOCENTER_POSITION, vr: Vr::DS },
    "IonBeamSequence" => DictionaryEntry { tag: ION_BEAM_SEQUENCE, vr: Vr::SQ },
    "IonControlPointSequence" => DictionaryEntry { tag: ION_CONTROL_POINT_SEQUENCE, vr: Vr::SQ },
};

pub fn keyword_of(tag: Tag) -> Option<&'static str> {
    DICTIONARY
        .entries()
        .find(|(_, entry)| entry.tag == tag)
        .map(|(keyword, _)| *keyword)
}

/// Default value representation for `tag`, `UN` when the tag is unknown.
pub fn vr_of(tag: Tag) -> Vr {
    DICTIONARY
        .values()
        .find(|entry| entry.tag == tag)
        .map_or(Vr::UN, |entry| entry.vr)
}

/// Keyword if known, otherwise the `(GGGG,EEEE)` form.
pub fn display_name(tag: Tag) -> String {
    keyword_of(tag).map_or_else(|| tag.to_string(), str::to_string)
}
