//! Read-only views of the source system: entity listing, query preview and
//! relationship analysis.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::TransferOrchestrator;
use crate::error::{MigrateError, Result};
use crate::record::Record;
use crate::schema::SchemaInspector;

/// Suffixes of history, sharing, feed and event entity types.
const INTERNAL_SUFFIXES: &[&str] = &[
    "History",
    "Share",
    "Feed",
    "ChangeEvent",
    "__e",
    "__mdt",
    "__x",
    "__b",
    "__hd",
];

/// Prefixes of platform metadata and audit entity types.
const INTERNAL_PREFIXES: &[&str] = &["Apex", "Aura", "Setup", "Permission"];

/// Whether an entity type is an internal, history, audit or change-event type.
pub fn is_internal_entity(name: &str) -> bool {
    INTERNAL_SUFFIXES.iter().any(|s| name.ends_with(s))
        || INTERNAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Namespace prefix of a custom entity (`ns__Name__c`), if any.
fn namespace(name: &str) -> Option<&str> {
    let mut parts = name.split("__");
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ns), Some(_), Some(_)) if !ns.is_empty() => Some(ns),
        _ => None,
    }
}

/// Sort key: un-namespaced names first, then by namespace and name.
fn sort_key(name: &str) -> (bool, String, String) {
    match namespace(name) {
        Some(ns) => (true, ns.to_lowercase(), name.to_lowercase()),
        None => (false, String::new(), name.to_lowercase()),
    }
}

/// Order entity names for display.
pub(crate) fn sort_entity_names(names: &mut [String]) {
    names.sort_by_cached_key(|name| sort_key(name));
}

/// First page of a preview query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPreview {
    pub records: Vec<Record>,
    pub total_available: u64,
    pub is_complete: bool,
}

impl TransferOrchestrator {
    /// Entity types in the source that can be transferred.
    pub async fn list_entity_types(&self) -> Result<Vec<String>> {
        let summaries = self.source.describe_global().await.map_err(MigrateError::Api)?;
        let total = summaries.len();

        let mut names: Vec<String> = summaries
            .into_iter()
            .filter(|s| s.queryable && s.creatable && !is_internal_entity(&s.name))
            .map(|s| s.name)
            .collect();
        sort_entity_names(&mut names);

        debug!("{} of {} entity types are transferable", names.len(), total);
        Ok(names)
    }

    /// Run a query against the source for preview.
    pub async fn run_query(&self, query: &str) -> Result<QueryPreview> {
        let page = self.source.query(query).await.map_err(MigrateError::Api)?;
        Ok(QueryPreview {
            records: page.records,
            total_available: page.total_size,
            is_complete: page.done,
        })
    }

    /// For each given entity type, the other given types it references.
    pub async fn analyze_relationships(
        &self,
        entity_types: &[String],
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let wanted: BTreeSet<&str> = entity_types.iter().map(String::as_str).collect();
        let mut inspector = SchemaInspector::new(self.source.clone());
        let mut related = BTreeMap::new();

        for entity in entity_types {
            let schema = inspector.describe(entity).await?;
            let parents: BTreeSet<String> = schema
                .fields
                .iter()
                .filter(|f| f.is_reference())
                .flat_map(|f| f.reference_targets.iter())
                .filter(|t| t.as_str() != entity.as_str() && wanted.contains(t.as_str()))
                .cloned()
                .collect();
            related.insert(entity.clone(), parents.into_iter().collect());
        }

        Ok(related)
    }
}
