use super::codec::{CodecError, PlanCodec};
use super::dataset::{Dataset, DatasetError, Element, Tag, Value, Vr};
use super::document::PlanDocument;
use super::tags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const ALPHABETIC: &str = "Alphabetic";
const VALUE: &str = "Value";

/// One attribute in the JSON model: `{"vr": "DS", "Value": [...]}` plus any
/// other members (`InlineBinary`, `BulkDataURI`) kept as they are. A missing
/// `vr` falls back to the dictionary default for the tag.
#[derive(Debug, Serialize, Deserialize)]
struct JsonElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vr: Option<String>,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    value: Option<Vec<JsonValue>>,
    #[serde(flatten)]
    other: Map<String, JsonValue>,
}

type JsonDataset = BTreeMap<String, JsonElement>;

/// Codec for the tag-keyed JSON representation of plan datasets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomJsonCodec;

impl DicomJsonCodec {
    pub fn read_from<R: Read>(reader: R) -> Result<PlanDocument, CodecError> {
        let json: JsonDataset = serde_json::from_reader(reader)?;
        decode_dataset(json).map(PlanDocument::new)
    }

    pub fn write_to<W: Write>(document: &PlanDocument, writer: W) -> Result<(), CodecError> {
        let json = encode_dataset(document.dataset())?;
        serde_json::to_writer_pretty(writer, &json)?;
        Ok(())
    }
}

impl PlanCodec for DicomJsonCodec {
    fn read(&self, path: &Path) -> Result<PlanDocument, CodecError> {
        let file = File::open(path).map_err(CodecError::io(path))?;
        Self::read_from(BufReader::new(file))
    }

    fn write(&self, path: &Path, document: &PlanDocument) -> Result<(), CodecError> {
        let file = File::create(path).map_err(CodecError::io(path))?;
        let mut writer = BufWriter::new(file);
        Self::write_to(document, &mut writer)?;
        writer.flush().map_err(CodecError::io(path))
    }
}

fn format_error(tag: &str, message: impl Into<String>) -> CodecError {
    CodecError::Format {
        tag: tag.to_string(),
        message: message.into(),
    }
}

fn decode_dataset(json: JsonDataset) -> Result<Dataset, CodecError> {
    json.into_iter()
        .map(|(key, element)| {
            let tag: Tag = key
                .parse()
                .map_err(|e: DatasetError| format_error(&key, e.to_string()))?;
            let vr: Vr = match element.vr.as_deref() {
                Some(text) => text
                    .parse()
                    .map_err(|e: DatasetError| format_error(&key, e.to_string()))?,
                None => tags::vr_of(tag),
            };
            let value = decode_value(&key, vr, element)?;
            Ok::<_, CodecError>((tag, Element::new(vr, value)))
        })
        .collect()
}

fn decode_value(key: &str, vr: Vr, element: JsonElement) -> Result<Value, CodecError> {
    let JsonElement { value, other, .. } = element;

    if !other.is_empty() {
        return Ok(Value::Opaque(opaque(value, other)));
    }
    let Some(values) = value else {
        return Ok(Value::Empty);
    };

    if vr == Vr::SQ {
        let items = values
            .into_iter()
            .map(|item| {
                if !item.is_object() {
                    return Err(format_error(key, "sequence item is not an object"));
                }
                let nested: JsonDataset = serde_json::from_value(item)?;
                decode_dataset(nested)
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Sequence(items));
    }

    if vr == Vr::PN {
        // Only single-component (alphabetic) names are interpreted.
        let names: Option<Vec<String>> = values.iter().map(alphabetic_name).collect();
        return Ok(match names {
            Some(names) => Value::Strings(names),
            None => Value::Opaque(opaque(Some(values), other)),
        });
    }

    values
        .into_iter()
        .map(|v| match v {
            JsonValue::String(s) => Ok(s),
            JsonValue::Number(n) => Ok(n.to_string()),
            JsonValue::Null => Ok(String::new()),
            other => Err(format_error(key, format!("unsupported value {}", other))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Strings)
}

fn alphabetic_name(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => Some(String::new()),
        JsonValue::Object(map) if map.keys().all(|k| k == ALPHABETIC) => Some(
            map.get(ALPHABETIC)
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        _ => None,
    }
}

fn opaque(value: Option<Vec<JsonValue>>, mut other: Map<String, JsonValue>) -> Map<String, JsonValue> {
    if let Some(values) = value {
        other.insert(VALUE.to_string(), JsonValue::Array(values));
    }
    other
}

fn encode_dataset(dataset: &Dataset) -> Result<JsonDataset, CodecError> {
    dataset
        .iter()
        .map(|(tag, element)| Ok::<_, CodecError>((tag.to_hex(), encode_element(element)?)))
        .collect()
}

fn encode_element(element: &Element) -> Result<JsonElement, CodecError> {
    let vr = element.vr;
    let (value, other) = match &element.value {
        Value::Empty => (None, Map::new()),
        Value::Opaque(map) => (None, map.clone()),
        Value::Sequence(items) => {
            let items = items
                .iter()
                .map(|item| Ok::<_, CodecError>(serde_json::to_value(encode_dataset(item)?)?))
                .collect::<Result<Vec<_>, CodecError>>()?;
            (Some(items), Map::new())
        }
        Value::Strings(values) => {
            let values: Vec<JsonValue> = values.iter().map(|s| encode_string(vr, s)).collect();
            (Some(values), Map::new())
        }
    };
    Ok(JsonElement {
        vr: Some(vr.to_string()),
        value,
        other,
    })
}

fn encode_string(vr: Vr, raw: &str) -> JsonValue {
    if raw.is_empty() {
        return JsonValue::Null;
    }
    if vr == Vr::PN {
        let mut name = Map::new();
        name.insert(ALPHABETIC.to_string(), JsonValue::String(raw.to_string()));
        return JsonValue::Object(name);
    }
    if vr.is_numeric() {
        if let Some(number) = encode_number(vr, raw.trim()) {
            return JsonValue::Number(number);
        }
    }
    JsonValue::String(raw.to_string())
}

/// Integral values are written without a fractional part; text that is not
/// a number stays a string so nothing is lost.
fn encode_number(vr: Vr, raw: &str) -> Option<Number> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    if vr.is_integer() {
        return raw.parse::<u64>().ok().map(Number::from);
    }
    let float: f64 = raw.parse().ok()?;
    if float.fract() == 0.0 && float.abs() < 1e15 {
        return Some(Number::from(float as i64));
    }
    Number::from_f64(float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::tags;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> JsonValue {
        json!({
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^Jane"}]},
            "00100020": {"vr": "LO", "Value": ["Jane_A1F"]},
            "7FE00010": {"vr": "OB", "InlineBinary": "AAEC"},
            "300A0002": {"vr": "SH"},
            "300A03A2": {"vr": "SQ", "Value": [{
                "300A00C0": {"vr": "IS", "Value": [1]},
                "300A03A8": {"vr": "SQ", "Value": [{
                    "300A0114": {"vr": "DS", "Value": [120.5]},
                    "300A012C": {"vr": "DS", "Value": [0, -12.5, "3"]}
                }]}
            }]}
        })
    }

    fn decode(value: JsonValue) -> PlanDocument {
        DicomJsonCodec::read_from(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn decodes_names_numbers_sequences_and_opaque_members() {
        let plan = decode(sample());
        let ds = plan.dataset();

        assert_eq!(ds.string(tags::PATIENT_NAME), Some("Doe^Jane"));
        assert_eq!(ds.string(tags::PATIENT_ID), Some("Jane_A1F"));
        assert_eq!(ds.get(tags::RT_PLAN_LABEL).unwrap().value, Value::Empty);
        assert!(matches!(
            ds.get(Tag::new(0x7FE0, 0x0010)).unwrap().value,
            Value::Opaque(_)
        ));

        let beam = &plan.beams().unwrap()[0];
        assert_eq!(beam.string(tags::BEAM_NUMBER), Some("1"));
        let cp = &beam.items(tags::ION_CONTROL_POINT_SEQUENCE).unwrap()[0];
        assert_eq!(cp.number(tags::NOMINAL_BEAM_ENERGY), Some(120.5));
        assert_eq!(plan.isocenter().unwrap().y, -12.5);
    }

    #[test]
    fn multi_component_names_are_kept_opaque() {
        let plan = decode(json!({
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe", "Ideographic": "X"}]}
        }));
        assert!(matches!(
            plan.dataset().get(tags::PATIENT_NAME).unwrap().value,
            Value::Opaque(_)
        ));
    }

    #[test]
    fn write_then_read_preserves_the_tree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plan = decode(sample());

        DicomJsonCodec.write(&path, &plan).unwrap();
        let reread = DicomJsonCodec.read(&path).unwrap();

        assert_eq!(reread.dataset().len(), plan.dataset().len());
        assert_eq!(reread.isocenter().unwrap(), plan.isocenter().unwrap());
        assert_eq!(
            reread.dataset().get(Tag::new(0x7FE0, 0x0010)),
            plan.dataset().get(Tag::new(0x7FE0, 0x0010))
        );
    }

    #[test]
    fn numeric_strings_are_written_as_json_numbers() {
        let mut ds = Dataset::new();
        ds.put_str(tags::GANTRY_ANGLE, Vr::DS, "90");
        ds.put_str(tags::NOMINAL_BEAM_ENERGY, Vr::DS, "120.25");
        ds.put_str(tags::PATIENT_NAME, Vr::PN, "Doe^Jane");
        ds.put_strings(tags::ISOCENTER_POSITION, Vr::DS, vec!["1e400".into(), "".into()]);

        let mut out = Vec::new();
        DicomJsonCodec::write_to(&PlanDocument::new(ds), &mut out).unwrap();
        let json: JsonValue = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["300A011E"]["Value"], json!([90]));
        assert_eq!(json["300A0114"]["Value"], json!([120.25]));
        assert_eq!(json["00100010"]["Value"], json!([{"Alphabetic": "Doe^Jane"}]));
        assert_eq!(json["300A012C"]["Value"], json!(["1e400", null]));
    }

    #[test]
    fn missing_vr_defaults_from_the_dictionary() {
        let plan = DicomJsonCodec::read_from(
            r#"{"300A011E": {"Value": [90]}, "00091001": {"Value": ["x"]}}"#.as_bytes(),
        )
        .unwrap();
        let ds = plan.dataset();
        assert_eq!(ds.get(tags::GANTRY_ANGLE).unwrap().vr, Vr::DS);
        assert_eq!(ds.get(Tag::new(0x0009, 0x1001)).unwrap().vr, Vr::UN);

        let mut out = Vec::new();
        DicomJsonCodec::write_to(&plan, &mut out).unwrap();
        let json: JsonValue = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["300A011E"]["vr"], "DS");
    }

    #[test]
    fn malformed_tags_and_items_are_format_errors() {
        let bad_tag = DicomJsonCodec::read_from(r#"{"XYZ": {"vr": "CS"}}"#.as_bytes());
        assert!(matches!(bad_tag, Err(CodecError::Format { .. })));

        let bad_item =
            DicomJsonCodec::read_from(r#"{"300A03A2": {"vr": "SQ", "Value": [3]}}"#.as_bytes());
        assert!(matches!(bad_item, Err(CodecError::Format { .. })));

        let not_json = DicomJsonCodec::read_from("not json".as_bytes());
        assert!(matches!(not_json, Err(CodecError::Json(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = DicomJsonCodec.read(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CodecError::Io { .. })));
    }
}
