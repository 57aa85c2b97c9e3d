//! Transfer orchestrator - main workflow coordinator.

mod catalog;

pub use catalog::{is_internal_entity, QueryPreview};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::{RemoteApi, RestClient};
use crate::config::{ClientConfig, Config, TransferConfig};
use crate::connection::{Connection, ConnectionResolver};
use crate::context::{RunContext, RunPhase};
use crate::error::{MigrateError, Result};
use crate::extract::{entity_from_query, Extracted, Extractor};
use crate::record::{IdentifierMap, Record, ID_FIELD};
use crate::relationships::{remap_references, RelationshipResolver};
use crate::report::ErrorReport;
use crate::sanitize::sanitize;
use crate::writer::BatchWriter;

/// Drives transfers between one verified source and target.
pub struct TransferOrchestrator {
    source: Arc<dyn RemoteApi>,
    target: Arc<dyn RemoteApi>,
}

/// Result of a transfer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    /// True iff no errors were recorded.
    pub success: bool,

    /// Records of the requested entity types created in the target.
    pub records_transferred: usize,

    /// Readable, collapsed error lines.
    pub errors: Vec<String>,

    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-entity breakdown, in processing order.
    pub entities: Vec<EntityOutcome>,
}

/// What happened to one entity type (or custom query) during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub entity: String,
    pub extracted: usize,
    pub transferred: usize,
    pub failed: usize,

    /// Remote write calls issued for this entity's own records.
    pub write_calls: usize,

    /// False when the source reported more records than were extracted.
    pub complete: bool,
}

/// Connectivity of one side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideHealth {
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check result for both systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source: SideHealth,
    pub target: SideHealth,
}

impl TransferResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl HealthCheckResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One unit of work in a run.
enum Plan<'a> {
    Entity(&'a str),
    Query {
        query: &'a str,
        entity: Option<&'a str>,
    },
}

impl Plan<'_> {
    fn label(&self) -> String {
        match self {
            Plan::Entity(name) => name.to_string(),
            Plan::Query {
                entity: Some(name), ..
            } => name.to_string(),
            Plan::Query { .. } => "custom query".to_string(),
        }
    }
}

fn plans(config: &TransferConfig) -> Vec<Plan<'_>> {
    match config.custom_query.as_deref() {
        Some(query) => vec![Plan::Query {
            query,
            entity: config.custom_query_entity.as_deref(),
        }],
        None => config
            .entity_types
            .iter()
            .map(|name| Plan::Entity(name.as_str()))
            .collect(),
    }
}

impl TransferOrchestrator {
    /// Resolve both configured systems and verify them.
    pub async fn from_config(config: &Config, resolver: &dyn ConnectionResolver) -> Result<Self> {
        let source = resolver.resolve_connection(&config.transfer.source)?;
        let target = resolver.resolve_connection(&config.transfer.target)?;
        Self::initialize(&source, &target, &config.client).await
    }

    /// Build REST clients for both connections and verify them.
    pub async fn initialize(
        source: &Connection,
        target: &Connection,
        client: &ClientConfig,
    ) -> Result<Self> {
        let source_api = RestClient::new(source, client)
            .map_err(|e| MigrateError::connection("source", e.to_string()))?;
        let target_api = RestClient::new(target, client)
            .map_err(|e| MigrateError::connection("target", e.to_string()))?;

        Self::connect(Arc::new(source_api), Arc::new(target_api)).await
    }

    /// Verify both systems answer an authenticated ping.
    ///
    /// Failure on either side is fatal.
    pub async fn connect(source: Arc<dyn RemoteApi>, target: Arc<dyn RemoteApi>) -> Result<Self> {
        debug!("{} -> {}", RunPhase::Uninitialized, RunPhase::ConnectionsVerified);
        verify("source", source.as_ref()).await?;
        verify("target", target.as_ref()).await?;
        info!("Source and target connections verified");
        Ok(Self { source, target })
    }

    pub fn source(&self) -> &Arc<dyn RemoteApi> {
        &self.source
    }

    pub fn target(&self) -> &Arc<dyn RemoteApi> {
        &self.target
    }

    /// Run a transfer. Always produces a result; failures are reported in it.
    pub async fn transfer(&self, config: &TransferConfig) -> TransferResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let mut report = ErrorReport::new();
        let mut entities = Vec::new();

        if let Err(e) = config.validate() {
            error!("Transfer configuration rejected: {}", e);
            report.push_error(&e);
        } else {
            info!(
                "Starting transfer run {} ({} mode, batch size {}, relationships {})",
                run_id,
                config.mode,
                config.batch_size,
                if config.include_relationships { "on" } else { "off" }
            );

            let mut ctx = RunContext::new(self.source.clone(), self.target.clone());
            for plan in plans(config) {
                let mut outcome = EntityOutcome {
                    entity: plan.label(),
                    ..Default::default()
                };
                if let Err(e) = self
                    .transfer_entity(&mut ctx, &plan, config, &mut report, &mut outcome)
                    .await
                {
                    warn!("{}: {}", outcome.entity, e);
                    report.push_error(&e);
                }
                entities.push(outcome);
            }
            ctx.enter(RunPhase::Completed, "run");
        }

        let errors = report.finish();
        let records_transferred = entities.iter().map(|e| e.transferred).sum();
        let result = TransferResult {
            success: errors.is_empty(),
            records_transferred,
            errors,
            run_id,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: clock.elapsed().as_secs_f64(),
            entities,
        };

        info!(
            "Transfer {}: {} records in {:.1}s, {} error(s)",
            if result.success { "completed" } else { "completed with errors" },
            result.records_transferred,
            result.duration_seconds,
            result.errors.len()
        );
        result
    }

    /// Extract, resolve, sanitize and write one entity type.
    async fn transfer_entity(
        &self,
        ctx: &mut RunContext,
        plan: &Plan<'_>,
        config: &TransferConfig,
        report: &mut ErrorReport,
        outcome: &mut EntityOutcome,
    ) -> Result<()> {
        let entity = match plan {
            Plan::Entity(name) => name.to_string(),
            Plan::Query {
                entity: Some(name), ..
            } => name.to_string(),
            Plan::Query { query, entity: None } => entity_from_query(query)?,
        };
        outcome.entity = entity.clone();
        ctx.enter(RunPhase::Extracting, &entity);

        let schema = ctx.source_schemas.describe(&entity).await?;
        let extractor = Extractor::new(ctx.source.as_ref());
        let Extracted {
            records, complete, ..
        } = match plan {
            Plan::Entity(_) => {
                extractor
                    .extract_entity(
                        &schema,
                        config.include_relationships,
                        config.record_limit(&entity),
                    )
                    .await?
            }
            Plan::Query { query, .. } => extractor.extract_query(&entity, query).await?,
        };
        outcome.extracted = records.len();
        outcome.complete = complete;

        if records.is_empty() {
            info!("{}: no records to transfer", entity);
            return Ok(());
        }

        let target_schema = ctx.target_schemas.describe(&entity).await?;

        // Parents resolved for this entity type, shared by all of its batches.
        let mut ids = IdentifierMap::new();

        for (index, batch) in records.chunks(config.batch_size).enumerate() {
            debug!("{}: batch {} ({} records)", entity, index + 1, batch.len());

            if config.include_relationships {
                ctx.enter(RunPhase::Resolving, &entity);
                let resolution = RelationshipResolver::new(ctx, config)
                    .resolve(&entity, &schema, batch, &ids)
                    .await;
                for e in &resolution.errors {
                    report.push_error(e);
                }
                ids.extend(resolution.ids);
            }

            ctx.enter(RunPhase::Writing, &entity);
            let prepared: Vec<Record> = batch
                .iter()
                .map(|record| {
                    let clean = sanitize(&remap_references(record, &schema, &ids));
                    match record.id() {
                        Some(id) => clean.with(ID_FIELD, id),
                        None => clean,
                    }
                })
                .collect();

            let written = BatchWriter::new(ctx.target.as_ref())
                .write(&entity, &prepared, &target_schema)
                .await;
            outcome.transferred += written.created_count();
            outcome.failed += written.failed_count();
            outcome.write_calls += written.calls;
            for e in &written.failures {
                report.push_error(e);
            }
        }

        info!(
            "{}: {} of {} records transferred",
            entity, outcome.transferred, outcome.extracted
        );
        Ok(())
    }
}

async fn verify(side: &str, api: &dyn RemoteApi) -> Result<()> {
    match api.identity().await {
        Ok(identity) => {
            debug!(
                "{} connected as {}",
                side,
                identity.display_name.as_deref().unwrap_or("(unknown)")
            );
            Ok(())
        }
        Err(failure) => {
            error!("{} connection failed: {}", side, failure);
            Err(MigrateError::connection(side, failure.to_string()))
        }
    }
}

/// Ping both systems without failing.
pub async fn health_check(source: &dyn RemoteApi, target: &dyn RemoteApi) -> HealthCheckResult {
    let source = ping(source).await;
    let target = ping(target).await;
    HealthCheckResult {
        healthy: source.connected && target.connected,
        source,
        target,
    }
}

async fn ping(api: &dyn RemoteApi) -> SideHealth {
    let start = Instant::now();
    let result = api.identity().await;
    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(identity) => SideHealth {
            connected: true,
            latency_ms,
            identity: identity.display_name,
            error: None,
        },
        Err(failure) => SideHealth {
            connected: false,
            latency_ms,
            identity: None,
            error: Some(failure.to_string()),
        },
    }
}
