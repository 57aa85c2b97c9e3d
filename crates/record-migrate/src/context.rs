//! Run-scoped state passed to every stage of a transfer.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::client::RemoteApi;
use crate::schema::SchemaInspector;

/// Phase of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Uninitialized,
    ConnectionsVerified,
    Extracting,
    Resolving,
    Writing,
    Completed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Uninitialized => "uninitialized",
            RunPhase::ConnectionsVerified => "connections_verified",
            RunPhase::Extracting => "extracting",
            RunPhase::Resolving => "resolving",
            RunPhase::Writing => "writing",
            RunPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Connections and caches for exactly one run.
///
/// Created fresh for each transfer so repeated or concurrent runs never
/// share schema caches or phase state.
pub struct RunContext {
    pub source: Arc<dyn RemoteApi>,
    pub target: Arc<dyn RemoteApi>,
    pub source_schemas: SchemaInspector,
    pub target_schemas: SchemaInspector,
    phase: RunPhase,
}

impl RunContext {
    /// Context for a run whose connections have already been verified.
    pub fn new(source: Arc<dyn RemoteApi>, target: Arc<dyn RemoteApi>) -> Self {
        Self {
            source_schemas: SchemaInspector::new(source.clone()),
            target_schemas: SchemaInspector::new(target.clone()),
            source,
            target,
            phase: RunPhase::ConnectionsVerified,
        }
    }

    /// Move to `phase`, logging the transition.
    pub fn enter(&mut self, phase: RunPhase, entity: &str) {
        if self.phase != phase {
            debug!("{}: {} -> {}", entity, self.phase, phase);
            self.phase = phase;
        }
    }
}
