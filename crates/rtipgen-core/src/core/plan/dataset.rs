use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Invalid attribute tag '{0}': expected eight hexadecimal digits")]
    InvalidTag(String),
    #[error("Invalid value representation '{0}': expected two uppercase letters")]
    InvalidVr(String),
}

/// An attribute tag: a (group, element) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// The tag as eight uppercase hexadecimal digits, the JSON model key form.
    pub fn to_hex(&self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl FromStr for Tag {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | ','))
            .collect();
        if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DatasetError::InvalidTag(s.to_string()));
        }
        let group = u16::from_str_radix(&digits[..4], 16)
            .map_err(|_| DatasetError::InvalidTag(s.to_string()))?;
        let element = u16::from_str_radix(&digits[4..], 16)
            .map_err(|_| DatasetError::InvalidTag(s.to_string()))?;
        Ok(Self { group, element })
    }
}

/// A two-letter value representation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vr([u8; 2]);

impl Vr {
    pub const AT: Vr = Vr(*b"AT");
    pub const CS: Vr = Vr(*b"CS");
    pub const DA: Vr = Vr(*b"DA");
    pub const DS: Vr = Vr(*b"DS");
    pub const FD: Vr = Vr(*b"FD");
    pub const FL: Vr = Vr(*b"FL");
    pub const IS: Vr = Vr(*b"IS");
    pub const LO: Vr = Vr(*b"LO");
    pub const PN: Vr = Vr(*b"PN");
    pub const SH: Vr = Vr(*b"SH");
    pub const SL: Vr = Vr(*b"SL");
    pub const SQ: Vr = Vr(*b"SQ");
    pub const SS: Vr = Vr(*b"SS");
    pub const SV: Vr = Vr(*b"SV");
    pub const UI: Vr = Vr(*b"UI");
    pub const UL: Vr = Vr(*b"UL");
    pub const UN: Vr = Vr(*b"UN");
    pub const US: Vr = Vr(*b"US");
    pub const UV: Vr = Vr(*b"UV");

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("UN")
    }

    /// Representations whose values are numbers in the JSON model.
    pub fn is_numeric(&self) -> bool {
        matches!(
            *self,
            Vr::DS | Vr::IS | Vr::FD | Vr::FL | Vr::SL | Vr::SS | Vr::SV | Vr::UL | Vr::US | Vr::UV
        )
    }

    /// Integer-valued numeric representations.
    pub fn is_integer(&self) -> bool {
        matches!(
            *self,
            Vr::IS | Vr::SL | Vr::SS | Vr::SV | Vr::UL | Vr::US | Vr::UV
        )
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vr {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.as_bytes() {
            &[a, b] if a.is_ascii_uppercase() && b.is_ascii_uppercase() => Ok(Vr([a, b])),
            _ => Err(DatasetError::InvalidVr(s.to_string())),
        }
    }
}

/// The value held by an [`Element`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Zero-length value.
    Empty,
    /// Textual or numeric values, kept in their string form.
    Strings(Vec<String>),
    /// Nested items of a sequence.
    Sequence(Vec<Dataset>),
    /// Content this model does not interpret (binary payloads, bulk data
    /// references, multi-component person names), preserved verbatim.
    Opaque(serde_json::Map<String, serde_json::Value>),
}

/// A single attribute: its value representation and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub vr: Vr,
    pub value: Value,
}

impl Element {
    pub fn new(vr: Vr, value: Value) -> Self {
        Self { vr, value }
    }

    pub fn strings(vr: Vr, values: Vec<String>) -> Self {
        Self::new(vr, Value::Strings(values))
    }

    pub fn sequence(items: Vec<Dataset>) -> Self {
        Self::new(Vr::SQ, Value::Sequence(items))
    }
}

/// An ordered collection of attributes keyed by tag.
///
/// Plan documents are datasets whose sequences nest further datasets; this
/// type models that tree without knowledge of any particular schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    elements: BTreeMap<Tag, Element>,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attributes at this level.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the element stored under `tag`, if any.
    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut Element> {
        self.elements.get_mut(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    /// Inserts or replaces an element.
    ///
    /// # Return
    ///
    /// The element previously stored under `tag`, if any.
    pub fn insert(&mut self, tag: Tag, element: Element) -> Option<Element> {
        self.elements.insert(tag, element)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        self.elements.remove(&tag)
    }

    /// Iterates over the attributes in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Element)> {
        self.elements.iter()
    }

    /// Returns the string values of `tag`.
    ///
    /// # Return
    ///
    /// `None` if the attribute is absent or is not a string-valued element.
    pub fn strings(&self, tag: Tag) -> Option<&[String]> {
        match &self.get(tag)?.value {
            Value::Strings(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the first string value of `tag`.
    pub fn string(&self, tag: Tag) -> Option<&str> {
        self.strings(tag)?.first().map(String::as_str)
    }

    /// Returns the first value of `tag` parsed as a number.
    pub fn number(&self, tag: Tag) -> Option<f64> {
        self.string(tag)?.trim().parse().ok()
    }

    /// Sets `tag` to the given string values.
    ///
    /// When the attribute already exists its value representation is kept;
    /// otherwise `vr` is used.
    pub fn put_strings(&mut self, tag: Tag, vr: Vr, values: Vec<String>) {
        let vr = self.get(tag).map_or(vr, |existing| existing.vr);
        self.insert(tag, Element::strings(vr, values));
    }

    /// Sets `tag` to a single string value.
    pub fn put_str(&mut self, tag: Tag, vr: Vr, value: impl Into<String>) {
        self.put_strings(tag, vr, vec![value.into()]);
    }

    /// Returns the items of the sequence `tag`.
    ///
    /// # Return
    ///
    /// `None` if the attribute is absent or is not a sequence.
    pub fn items(&self, tag: Tag) -> Option<&[Dataset]> {
        match &self.get(tag)?.value {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn items_mut(&mut self, tag: Tag) -> Option<&mut Vec<Dataset>> {
        match &mut self.get_mut(tag)?.value {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Replaces the sequence `tag` with `items`.
    pub fn put_items(&mut self, tag: Tag, items: Vec<Dataset>) {
        self.insert(tag, Element::sequence(items));
    }
}

impl FromIterator<(Tag, Element)> for Dataset {
    fn from_iter<I: IntoIterator<Item = (Tag, Element)>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}
