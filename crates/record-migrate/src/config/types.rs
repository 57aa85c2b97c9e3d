//! Configuration type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest batch the composite create call accepts.
pub const MAX_BATCH_SIZE: usize = 200;

/// Upper bound for `client.max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote systems by identifier.
    #[serde(default)]
    pub systems: BTreeMap<String, SystemConfig>,

    /// HTTP client behavior.
    #[serde(default)]
    pub client: ClientConfig,

    /// What to transfer and how.
    pub transfer: TransferConfig,
}

/// One remote system and where its credential comes from.
#[derive(Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Base URL (e.g. "https://acme.my.example.com").
    pub endpoint_url: String,

    /// Bearer token, inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,

    /// When the token stops being valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for SystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access_token_env", &self.access_token_env)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST API version (default: "59.0").
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient read failures (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Transfer behavior configuration.
///
/// Exactly one of `entity_types` and `custom_query` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Source system identifier.
    #[serde(default)]
    pub source: String,

    /// Target system identifier.
    #[serde(default)]
    pub target: String,

    /// Entity types to transfer, in order.
    #[serde(default)]
    pub entity_types: Vec<String>,

    /// Query used verbatim for extraction instead of entity types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_query: Option<String>,

    /// Entity type the custom query reads. Derived from the query text if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_query_entity: Option<String>,

    /// Resolve and remap parent references (default: false).
    #[serde(default)]
    pub include_relationships: bool,

    /// Records per write call (default: 200).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum records extracted per entity type.
    #[serde(default)]
    pub record_limits: BTreeMap<String, usize>,

    /// External id field per entity type, used to match parents in upsert mode.
    #[serde(default)]
    pub external_id_mapping: BTreeMap<String, String>,

    /// How parent references are satisfied (default: insert).
    #[serde(default)]
    pub mode: TransferMode,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            target: String::new(),
            entity_types: Vec::new(),
            custom_query: None,
            custom_query_entity: None,
            include_relationships: false,
            batch_size: default_batch_size(),
            record_limits: BTreeMap::new(),
            external_id_mapping: BTreeMap::new(),
            mode: TransferMode::default(),
        }
    }
}

impl TransferConfig {
    /// Transfer the given entity types with default settings.
    pub fn for_entities<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_types: entities.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Transfer the results of a custom query with default settings.
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            custom_query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_relationships(mut self, include: bool) -> Self {
        self.include_relationships = include;
        self
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_record_limit(mut self, entity: impl Into<String>, limit: usize) -> Self {
        self.record_limits.insert(entity.into(), limit);
        self
    }

    pub fn with_external_id(mut self, entity: impl Into<String>, field: impl Into<String>) -> Self {
        self.external_id_mapping.insert(entity.into(), field.into());
        self
    }

    /// Configured record limit for an entity type.
    pub fn record_limit(&self, entity: &str) -> Option<usize> {
        self.record_limits.get(entity).copied()
    }
}

/// How references to parent records are satisfied in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Create a fresh copy of every referenced parent.
    #[default]
    Insert,

    /// Match existing target parents through an external id field.
    Upsert,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Insert => f.write_str("insert"),
            TransferMode::Upsert => f.write_str("upsert"),
        }
    }
}

// Default value functions for serde
fn default_api_version() -> String {
    "59.0".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
