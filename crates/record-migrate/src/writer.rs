//! Batched record creation in the target system.

use tracing::debug;

use crate::client::{ApiFailure, RemoteApi, SaveResult};
use crate::error::MigrateError;
use crate::record::Record;
use crate::sanitize::is_excluded;
use crate::schema::EntitySchema;

/// Outcome of writing one batch. Every input record appears exactly once,
/// either as created or as failed.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    /// (source id, target id) for each created record.
    pub created: Vec<(Option<String>, String)>,

    /// Per-record failures.
    pub failures: Vec<MigrateError>,

    /// Remote write calls issued.
    pub calls: usize,
}

impl WriteOutcome {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// Drop every key the target will not accept on create.
///
/// Relationship projections and unknown fields are removed along with
/// read-only ones.
pub fn prepare_payload(record: &Record, target: &EntitySchema) -> Record {
    record.filtered(|name, _| !is_excluded(name) && target.accepts_on_create(name))
}

/// Writes batches of records to the target system.
pub struct BatchWriter<'a> {
    api: &'a dyn RemoteApi,
}

impl<'a> BatchWriter<'a> {
    pub fn new(api: &'a dyn RemoteApi) -> Self {
        Self { api }
    }

    /// Create one batch of records with a single remote call.
    ///
    /// `records` keep their source ids; payloads are filtered against the
    /// target schema before sending. Partial success is normal: each record
    /// succeeds or fails on its own.
    pub async fn write(
        &self,
        entity: &str,
        records: &[Record],
        target: &EntitySchema,
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        if records.is_empty() {
            return outcome;
        }

        let payloads: Vec<Record> = records
            .iter()
            .map(|r| prepare_payload(r, target))
            .collect();

        debug!("Writing {} {} record(s)", payloads.len(), entity);
        outcome.calls = 1;

        let results: Vec<SaveResult> = if payloads.len() == 1 {
            match self.api.create(entity, &payloads[0]).await {
                Ok(result) => vec![result],
                Err(failure) => vec![SaveResult::failed(failure)],
            }
        } else {
            match self.api.create_many(entity, &payloads).await {
                Ok(results) if results.len() == records.len() => results,
                Ok(results) => {
                    let failure = ApiFailure::Message(format!(
                        "Target returned {} results for {} records",
                        results.len(),
                        records.len()
                    ));
                    records
                        .iter()
                        .map(|_| SaveResult::failed(failure.clone()))
                        .collect()
                }
                // The whole request failed: every record in it failed the same way.
                Err(failure) => records
                    .iter()
                    .map(|_| SaveResult::failed(failure.clone()))
                    .collect(),
            }
        };

        for (record, result) in records.iter().zip(results) {
            let source_id = record.id().map(str::to_string);
            match (result.success, result.id.as_deref()) {
                (true, Some(target_id)) => outcome.created.push((source_id, target_id.to_string())),
                (true, None) => outcome.failures.push(MigrateError::RecordWrite {
                    entity: entity.to_string(),
                    source_id,
                    failure: ApiFailure::Message("Create succeeded without returning an id".into()),
                }),
                (false, _) => outcome.failures.push(MigrateError::RecordWrite {
                    entity: entity.to_string(),
                    source_id,
                    failure: result.failure(),
                }),
            }
        }

        outcome
    }
}
