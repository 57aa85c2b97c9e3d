//! Records and source-to-target identifier maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Reserved key carrying the source-assigned identifier.
pub const ID_FIELD: &str = "Id";

/// Per-record metadata block the platform attaches to query results.
pub const ATTRIBUTES_FIELD: &str = "attributes";

/// A single record: field name to JSON value.
///
/// Records are treated as immutable values. Sanitizing or remapping a record
/// produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON value, returning `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Return a copy with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Source-assigned identifier, if present.
    pub fn id(&self) -> Option<&str> {
        self.get_str(ID_FIELD)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// String value of a field; empty strings count as absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// New record containing only the fields for which `keep` returns true.
    pub fn filtered<F>(&self, mut keep: F) -> Record
    where
        F: FnMut(&str, &Value) -> bool,
    {
        let fields = self
            .fields
            .iter()
            .filter(|(k, v)| keep(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Record { fields }
    }

    /// New record with `name` replaced by `value`; other fields are copied.
    pub fn replaced(&self, name: &str, value: Value) -> Record {
        let mut fields = self.fields.clone();
        fields.insert(name.to_string(), value);
        Record { fields }
    }
}

/// Source-id to target-id mappings, kept separately per parent entity type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifierMap {
    entries: BTreeMap<String, HashMap<String, String>>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source_id` of `entity` now lives at `target_id`.
    pub fn insert(
        &mut self,
        entity: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) {
        self.entries
            .entry(entity.into())
            .or_default()
            .insert(source_id.into(), target_id.into());
    }

    /// Target id for a source id of the given parent type.
    pub fn get(&self, entity: &str, source_id: &str) -> Option<&str> {
        self.entries
            .get(entity)
            .and_then(|ids| ids.get(source_id))
            .map(String::as_str)
    }

    /// Whether any id of this parent type was resolved.
    pub fn has_entity(&self, entity: &str) -> bool {
        self.entries.get(entity).is_some_and(|ids| !ids.is_empty())
    }

    /// Total number of resolved ids across all parent types.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge another map into this one; later entries win.
    pub fn extend(&mut self, other: IdentifierMap) {
        for (entity, ids) in other.entries {
            self.entries.entry(entity).or_default().extend(ids);
        }
    }
}
