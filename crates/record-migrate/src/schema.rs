//! Entity metadata and the per-run schema cache.
//!
//! Field descriptors come straight from the platform's describe call. The
//! [`SchemaInspector`] caches one [`EntitySchema`] per entity type for the
//! lifetime of a single run; nothing is shared between runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::client::RemoteApi;
use crate::error::{MigrateError, Result};

/// Fields owned by the platform. Never extracted for writing, never sent.
pub const SYSTEM_FIELDS: &[&str] = &[
    "Id",
    "attributes",
    "IsDeleted",
    "MasterRecordId",
    "OwnerId",
    "CreatedDate",
    "CreatedById",
    "LastModifiedDate",
    "LastModifiedById",
    "SystemModstamp",
    "LastActivityDate",
    "LastViewedDate",
    "LastReferencedDate",
];

/// Suffix of read-only fields projected from a related person record.
pub const READ_ONLY_SUFFIX: &str = "__pr";

/// Metadata for one field of an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// API name of the field.
    pub name: String,

    /// Platform type (e.g. "string", "reference", "date").
    #[serde(rename = "type", default)]
    pub field_type: String,

    /// Whether a value may be supplied on create.
    #[serde(rename = "createable", default)]
    pub creatable: bool,

    #[serde(default)]
    pub updateable: bool,

    /// Entity types this field may point at; empty for non-references.
    #[serde(rename = "referenceTo", default)]
    pub reference_targets: Vec<String>,

    /// Name used to traverse the reference in queries (e.g. "Account").
    #[serde(default)]
    pub relationship_name: Option<String>,

    #[serde(rename = "externalId", default)]
    pub is_external_id: bool,

    /// Formula / roll-up fields.
    #[serde(rename = "calculated", default)]
    pub is_calculated: bool,
}

impl FieldDescriptor {
    /// Whether the field holds the identifier of another record.
    pub fn is_reference(&self) -> bool {
        self.field_type == "reference" || !self.reference_targets.is_empty()
    }

    /// The entity type references are resolved against.
    ///
    /// Polymorphic fields only resolve against their first declared target.
    pub fn primary_target(&self) -> Option<&str> {
        self.reference_targets.first().map(String::as_str)
    }

    /// Whether the field may be read for writing and sent on create.
    pub fn is_insertable(&self) -> bool {
        !is_system_field(&self.name)
            && !has_read_only_suffix(&self.name)
            && !self.is_calculated
    }
}

/// Whether a field name is one of the platform-owned fields.
pub fn is_system_field(name: &str) -> bool {
    SYSTEM_FIELDS.contains(&name)
}

/// Whether a field name carries the read-only related-record suffix.
pub fn has_read_only_suffix(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(READ_ONLY_SUFFIX)
}

/// Metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity type name.
    pub name: String,

    /// Field descriptors in platform order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that can be extracted and written back.
    pub fn insertable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_insertable())
    }

    /// Insertable reference fields, the ones relationship resolution remaps.
    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.insertable_fields().filter(|f| f.is_reference())
    }

    pub fn has_references(&self) -> bool {
        self.reference_fields().next().is_some()
    }

    /// Whether the target accepts a value for this field on create.
    pub fn accepts_on_create(&self, name: &str) -> bool {
        self.field(name)
            .is_some_and(|f| f.creatable && f.is_insertable())
    }
}

/// Describes entity types through one remote system and caches the results
/// for the duration of a run.
pub struct SchemaInspector {
    api: Arc<dyn RemoteApi>,
    cache: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaInspector {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            cache: HashMap::new(),
        }
    }

    /// Fetch (or return the cached) schema for an entity type.
    pub async fn describe(&mut self, entity: &str) -> Result<Arc<EntitySchema>> {
        if let Some(schema) = self.cache.get(entity) {
            return Ok(schema.clone());
        }

        debug!("Describing {}", entity);
        let schema = self
            .api
            .describe(entity)
            .await
            .map_err(|failure| MigrateError::SchemaFetch {
                entity: entity.to_string(),
                failure,
            })?;

        let schema = Arc::new(schema);
        self.cache.insert(entity.to_string(), schema.clone());
        Ok(schema)
    }
}
