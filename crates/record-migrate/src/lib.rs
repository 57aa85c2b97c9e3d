//! # record-migrate
//!
//! Record transfer engine for schema-described REST APIs.
//!
//! This library copies records of one or more entity types from a source
//! system to a target system while keeping parent references intact:
//!
//! - **Schema-aware extraction** selecting only fields the target can accept
//! - **Relationship resolution** by copying parents (insert mode) or matching
//!   them on an external id (upsert mode)
//! - **Batched writes** with per-record success and failure
//! - **Readable error reports** with repeated failures collapsed
//!
//! ## Example
//!
//! ```rust,no_run
//! use record_migrate::{Config, TransferOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> record_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = TransferOrchestrator::from_config(&config, &config.resolver()).await?;
//!     let result = orchestrator.transfer(&config.transfer).await;
//!     println!("Transferred {} records", result.records_transferred);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod record;
pub mod relationships;
pub mod report;
pub mod sanitize;
pub mod schema;
pub mod writer;

// Re-exports for convenient access
pub use client::{ApiFailure, EntitySummary, QueryPage, RemoteApi, RestClient, SaveResult};
pub use config::{ClientConfig, Config, SystemConfig, TransferConfig, TransferMode};
pub use connection::{ConfiguredSystems, Connection, ConnectionResolver};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    health_check, EntityOutcome, HealthCheckResult, QueryPreview, TransferOrchestrator,
    TransferResult,
};
pub use record::{IdentifierMap, Record};
pub use schema::{EntitySchema, FieldDescriptor, SchemaInspector};
