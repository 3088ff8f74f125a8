//! Record types that flow through the extraction pipeline.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Raw field values recovered from a model response, not yet checked
/// against any schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRecord {
    fields: BTreeMap<String, String>,
}

impl CandidateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.fields.remove(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CandidateRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A record proven to satisfy a [`crate::schema::RecordSchema`].
///
/// Holds exactly the schema's fields, in schema order. It can only be built
/// by the validator, which is the only form ever persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    schema: String,
    fields: Vec<(String, String)>,
}

impl ValidatedRecord {
    pub(crate) fn new(schema: &str, fields: Vec<(String, String)>) -> Self {
        Self {
            schema: schema.to_string(),
            fields,
        }
    }

    /// Name of the schema this record was validated against.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for ValidatedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One schema field that failed validation, with the offending raw value
/// (`None` when the field was missing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub value: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}: {:?} is not an allowed value", self.field, value),
            None => write!(f, "{}: missing", self.field),
        }
    }
}

/// Violations in schema field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationReport {
    violations: Vec<Violation>,
}

impl ViolationReport {
    pub(crate) fn push(&mut self, field: &str, value: Option<&str>) {
        self.violations.push(Violation {
            field: field.to_string(),
            value: value.map(String::from),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}
