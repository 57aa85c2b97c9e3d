//! Reading records from the source system.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::client::RemoteApi;
use crate::error::{MigrateError, Result};
use crate::record::{Record, ID_FIELD};
use crate::schema::EntitySchema;

/// Records produced by one extraction.
#[derive(Debug, Clone)]
pub struct Extracted {
    /// Entity type the records belong to.
    pub entity: String,

    pub records: Vec<Record>,

    /// Total matching records reported by the source.
    pub total_available: u64,

    /// False when the source had more records than one response carries.
    pub complete: bool,
}

fn from_clause() -> &'static Regex {
    static FROM: OnceLock<Regex> = OnceLock::new();
    FROM.get_or_init(|| {
        Regex::new(r"(?i)\bFROM\s+([A-Za-z_][A-Za-z0-9_]*)").expect("FROM pattern is valid")
    })
}

/// Derive the primary entity type of a query from its FROM clause.
///
/// Takes the first identifier after the first `FROM` keyword. Sub-selects
/// in the field list are not understood.
pub fn entity_from_query(query: &str) -> Result<String> {
    from_clause()
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MigrateError::QueryParse(query.trim().to_string()))
}

/// Build the extraction query for an entity type.
///
/// Selects the id plus every insertable field. With `include_relationships`
/// the relationship name of each reference field is projected as well, for
/// inspection only.
pub fn build_query(schema: &EntitySchema, include_relationships: bool, limit: Option<usize>) -> String {
    let mut columns: Vec<String> = vec![ID_FIELD.to_string()];
    columns.extend(schema.insertable_fields().map(|f| f.name.clone()));

    if include_relationships {
        for field in schema.reference_fields() {
            if let Some(rel) = field.relationship_name.as_deref().filter(|r| !r.is_empty()) {
                columns.push(format!("{}.{}", rel, ID_FIELD));
            }
        }
    }

    let mut query = format!("SELECT {} FROM {}", columns.join(", "), schema.name);
    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {}", limit));
    }
    query
}

/// Issues read queries against the source system.
pub struct Extractor<'a> {
    api: &'a dyn RemoteApi,
}

impl<'a> Extractor<'a> {
    pub fn new(api: &'a dyn RemoteApi) -> Self {
        Self { api }
    }

    /// Extract an entity type using a query built from its schema.
    pub async fn extract_entity(
        &self,
        schema: &EntitySchema,
        include_relationships: bool,
        limit: Option<usize>,
    ) -> Result<Extracted> {
        let query = build_query(schema, include_relationships, limit);
        self.run(&schema.name, &query).await
    }

    /// Extract with a caller-supplied query, used verbatim.
    pub async fn extract_query(&self, entity: &str, query: &str) -> Result<Extracted> {
        self.run(entity, query).await
    }

    async fn run(&self, entity: &str, query: &str) -> Result<Extracted> {
        debug!("Extracting {}: {}", entity, query);
        let page = self.api.query(query).await.map_err(MigrateError::Api)?;

        if !page.done {
            warn!(
                "{}: source holds {} records but only the first {} were returned",
                entity,
                page.total_size,
                page.records.len()
            );
        }

        Ok(Extracted {
            entity: entity.to_string(),
            total_available: page.total_size,
            complete: page.done,
            records: page.records,
        })
    }
}
