//! Error types for the migration library.

use crate::client::ApiFailure;
use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No usable credential for a configured system
    #[error("Credential error for system '{system}': {message}")]
    Credential { system: String, message: String },

    /// Source or target system could not be reached or rejected the credential
    #[error("Connection error ({side}): {message}")]
    Connection { side: String, message: String },

    /// Entity metadata could not be fetched
    #[error("Failed to describe {entity}: {failure}")]
    SchemaFetch { entity: String, failure: ApiFailure },

    /// Primary entity type could not be derived from a custom query
    #[error("Could not determine the entity type from query '{0}': no object name follows FROM")]
    QueryParse(String),

    /// Upsert mode without an external id field for a parent entity type
    #[error(
        "No external ID field specified for {0}. Add an external_id_mapping entry for {0} \
         so references to it can be matched in the target"
    )]
    ExternalIdConfiguration(String),

    /// A single record was rejected by the target
    #[error("Failed to create {entity} record{}: {failure}", source_id_suffix(.source_id))]
    RecordWrite {
        entity: String,
        source_id: Option<String>,
        failure: ApiFailure,
    },

    /// A referenced parent could not be located
    #[error("Could not resolve {entity} {source_id}: {message}")]
    RelationshipLookup {
        entity: String,
        source_id: String,
        message: String,
    },

    /// A remote read failed outside of the more specific cases above
    #[error("Remote request failed: {0}")]
    Api(ApiFailure),

    /// HTTP client construction or transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn source_id_suffix(source_id: &Option<String>) -> String {
    match source_id {
        Some(id) => format!(" (source id {})", id),
        None => String::new(),
    }
}

impl MigrateError {
    /// Create a Connection error for one side of the transfer.
    pub fn connection(side: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connection {
            side: side.into(),
            message: message.into(),
        }
    }

    /// Create a Credential error
    pub fn credential(system: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Credential {
            system: system.into(),
            message: message.into(),
        }
    }

    /// Create a RelationshipLookup error
    pub fn lookup(
        entity: impl Into<String>,
        source_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::RelationshipLookup {
            entity: entity.into(),
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Credential { .. } | MigrateError::Connection { .. } => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
