//! Parent reference resolution.
//!
//! For a batch of child records, find the parent records they point at and
//! work out where those parents live in the target:
//!
//! - **insert** mode copies every referenced parent into the target and maps
//!   the source id to the newly created id. Within one entity type a parent is
//!   copied once, however many batches reference it. Parents are copied again
//!   on every run; nothing is matched against earlier copies.
//! - **upsert** mode reads each parent's external id value from the source and
//!   looks up a target record with the same value.
//!
//! Only one hop is resolved. Reference fields on the parents themselves are
//! dropped before the parents are created.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::config::{TransferConfig, TransferMode};
use crate::context::RunContext;
use crate::error::{MigrateError, Result};
use crate::record::{IdentifierMap, Record, ID_FIELD};
use crate::sanitize::sanitize;
use crate::schema::EntitySchema;
use crate::writer::BatchWriter;

/// Parent ids fetched from the source per query.
const LOOKUP_CHUNK: usize = 100;

/// Result of resolving one batch.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved source-id to target-id mappings, per parent type.
    pub ids: IdentifierMap,

    /// Problems met along the way. Resolution continues past each of them.
    pub errors: Vec<MigrateError>,

    /// Parent records created in the target (insert mode).
    pub parents_created: usize,
}

/// Referenced parent ids in a batch, grouped by parent entity type.
///
/// Polymorphic references are grouped under their first declared target.
pub fn collect_parent_ids(
    schema: &EntitySchema,
    batch: &[Record],
) -> BTreeMap<String, BTreeSet<String>> {
    let mut parents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for field in schema.reference_fields() {
        let Some(parent) = field.primary_target() else {
            continue;
        };
        for record in batch {
            if let Some(id) = record.get_str(&field.name) {
                parents
                    .entry(parent.to_string())
                    .or_default()
                    .insert(id.to_string());
            }
        }
    }
    parents
}

/// Rewrite reference fields through `ids`.
///
/// Unresolved references keep their source value; the target is expected to
/// reject them.
pub fn remap_references(record: &Record, schema: &EntitySchema, ids: &IdentifierMap) -> Record {
    let mut remapped = record.clone();
    for field in schema.reference_fields() {
        let Some(parent) = field.primary_target() else {
            continue;
        };
        let target_id = remapped
            .get_str(&field.name)
            .and_then(|source_id| ids.get(parent, source_id))
            .map(str::to_string);
        if let Some(target_id) = target_id {
            remapped = remapped.replaced(&field.name, Value::String(target_id));
        }
    }
    remapped
}

/// Quote a string literal for use in a query.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn id_list(ids: &[&String]) -> String {
    ids.iter()
        .map(|id| quote_literal(id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render an external id value as a query literal.
fn external_id_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(quote_literal(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolves references for batches of one run.
pub struct RelationshipResolver<'a> {
    ctx: &'a mut RunContext,
    config: &'a TransferConfig,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(ctx: &'a mut RunContext, config: &'a TransferConfig) -> Self {
        Self { ctx, config }
    }

    /// Resolve every parent referenced by `batch` that `known` does not
    /// already map. `Resolution::ids` holds only the new mappings.
    pub async fn resolve(
        &mut self,
        entity: &str,
        schema: &EntitySchema,
        batch: &[Record],
        known: &IdentifierMap,
    ) -> Resolution {
        let mut resolution = Resolution::default();
        if !schema.has_references() {
            return resolution;
        }

        let mut parents = collect_parent_ids(schema, batch);
        for (parent, ids) in parents.iter_mut() {
            ids.retain(|id| known.get(parent, id).is_none());
        }
        parents.retain(|_, ids| !ids.is_empty());

        for (parent, ids) in &parents {
            debug!(
                "{}: resolving {} {} reference(s) ({} mode)",
                entity,
                ids.len(),
                parent,
                self.config.mode
            );
            let ids: Vec<&String> = ids.iter().collect();
            let result = match self.config.mode {
                TransferMode::Insert => self.insert_parents(parent, &ids, &mut resolution).await,
                TransferMode::Upsert => self.match_parents(parent, &ids, &mut resolution).await,
            };
            if let Err(e) = result {
                resolution.errors.push(e);
            }
        }

        if resolution.parents_created > 0 {
            info!(
                "{}: created {} parent record(s) in target",
                entity, resolution.parents_created
            );
        }
        resolution
    }

    /// Copy parents from source to target.
    async fn insert_parents(
        &mut self,
        parent: &str,
        ids: &[&String],
        resolution: &mut Resolution,
    ) -> Result<()> {
        let source_schema = self.ctx.source_schemas.describe(parent).await?;
        let target_schema = self.ctx.target_schemas.describe(parent).await?;

        let mut columns = vec![ID_FIELD.to_string()];
        columns.extend(
            source_schema
                .insertable_fields()
                .filter(|f| !f.is_reference())
                .map(|f| f.name.clone()),
        );

        let mut payloads = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let query = format!(
                "SELECT {} FROM {} WHERE Id IN ({})",
                columns.join(", "),
                parent,
                id_list(chunk)
            );
            let found = self.fetch(parent, chunk, &query, resolution).await;
            for record in found {
                if let Some(id) = record.id().map(str::to_string) {
                    payloads.push(sanitize(&record).with(ID_FIELD, id));
                }
            }
        }

        let writer = BatchWriter::new(self.ctx.target.as_ref());
        for batch in payloads.chunks(self.config.batch_size.max(1)) {
            let outcome = writer.write(parent, batch, &target_schema).await;
            for (source_id, target_id) in outcome.created {
                if let Some(source_id) = source_id {
                    resolution.ids.insert(parent, source_id, target_id);
                    resolution.parents_created += 1;
                }
            }
            resolution.errors.extend(outcome.failures);
        }
        Ok(())
    }

    /// Match parents to existing target records by external id.
    async fn match_parents(
        &mut self,
        parent: &str,
        ids: &[&String],
        resolution: &mut Resolution,
    ) -> Result<()> {
        let external_id = self
            .config
            .external_id_mapping
            .get(parent)
            .ok_or_else(|| MigrateError::ExternalIdConfiguration(parent.to_string()))?;

        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let query = format!(
                "SELECT Id, {} FROM {} WHERE Id IN ({})",
                external_id,
                parent,
                id_list(chunk)
            );
            let found = self.fetch(parent, chunk, &query, resolution).await;

            for record in found {
                let Some(source_id) = record.id().map(str::to_string) else {
                    continue;
                };
                let Some(literal) = record.get(external_id).and_then(external_id_literal) else {
                    resolution.errors.push(MigrateError::lookup(
                        parent,
                        source_id,
                        format!("no value in external ID field {}", external_id),
                    ));
                    continue;
                };

                let lookup = format!(
                    "SELECT Id FROM {} WHERE {} = {} LIMIT 1",
                    parent, external_id, literal
                );
                match self.ctx.target.query(&lookup).await {
                    Ok(page) => match page.records.first().and_then(Record::id) {
                        Some(target_id) => resolution.ids.insert(parent, source_id, target_id),
                        None => resolution.errors.push(MigrateError::lookup(
                            parent,
                            source_id,
                            format!(
                                "no {} with {} = {} exists in the target. Transfer {} records first",
                                parent, external_id, literal, parent
                            ),
                        )),
                    },
                    Err(failure) => resolution.errors.push(MigrateError::lookup(
                        parent,
                        source_id,
                        format!("target lookup failed: {}", failure),
                    )),
                }
            }
        }
        Ok(())
    }

    /// Query parents from the source, reporting ids that could not be read.
    async fn fetch(
        &self,
        parent: &str,
        ids: &[&String],
        query: &str,
        resolution: &mut Resolution,
    ) -> Vec<Record> {
        let records = match self.ctx.source.query(query).await {
            Ok(page) => page.records,
            Err(failure) => {
                for id in ids {
                    resolution.errors.push(MigrateError::lookup(
                        parent,
                        id.as_str(),
                        format!("source query failed: {}", failure),
                    ));
                }
                return Vec::new();
            }
        };

        let returned: BTreeSet<&str> = records.iter().filter_map(Record::id).collect();
        for id in ids.iter().filter(|id| !returned.contains(id.as_str())) {
            resolution.errors.push(MigrateError::lookup(
                parent,
                id.as_str(),
                "not found in source",
            ));
        }
        records
    }
}
