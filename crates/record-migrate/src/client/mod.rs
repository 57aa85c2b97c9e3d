//! Remote API boundary.
//!
//! The engine talks to both systems only through [`RemoteApi`]. Whatever
//! shape a failure has on the wire, it crosses this boundary as one of the
//! [`ApiFailure`] variants.

mod rest;

pub use rest::RestClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::Record;
use crate::report;
use crate::schema::EntitySchema;

/// Failure reported by a remote system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFailure {
    /// Unstructured message.
    Message(String),

    /// Platform error with an optional status code and the offending fields.
    Structured {
        message: String,
        status_code: Option<String>,
        fields: Vec<String>,
    },

    /// Non-success HTTP response without a parseable error body.
    Http { status: u16, message: String },

    /// Several failures reported together.
    Many(Vec<ApiFailure>),
}

impl ApiFailure {
    pub fn structured(
        message: impl Into<String>,
        status_code: Option<&str>,
        fields: Vec<String>,
    ) -> Self {
        ApiFailure::Structured {
            message: message.into(),
            status_code: status_code.map(str::to_string),
            fields,
        }
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiFailure::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&report::stringify(self))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiFailure>;

/// Identity of the authenticated user, returned by the ping call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Whatever the system reports about itself (user or org name).
    pub display_name: Option<String>,
}

/// Entry from the global describe call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,

    #[serde(default)]
    pub custom: bool,

    #[serde(default = "default_true")]
    pub queryable: bool,

    #[serde(rename = "createable", default = "default_true")]
    pub creatable: bool,
}

fn default_true() -> bool {
    true
}

/// One response page of a query.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub records: Vec<Record>,

    /// Total matching records on the server.
    pub total_size: u64,

    /// False when further pages exist.
    pub done: bool,
}

/// Per-record result of a create call.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    /// Id of the created record on success.
    pub id: Option<String>,

    pub success: bool,

    pub errors: Vec<ApiFailure>,
}

impl SaveResult {
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(failure: ApiFailure) -> Self {
        Self {
            id: None,
            success: false,
            errors: vec![failure],
        }
    }

    /// The failure of an unsuccessful save, folded into one value.
    pub fn failure(&self) -> ApiFailure {
        match self.errors.as_slice() {
            [] => ApiFailure::Message("Record was not created and no error was reported".into()),
            [single] => single.clone(),
            many => ApiFailure::Many(many.to_vec()),
        }
    }
}

/// Calls the transfer engine needs from a remote system.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Cheap authenticated call used to verify the connection.
    async fn identity(&self) -> ApiResult<Identity>;

    /// List every entity type the system exposes.
    async fn describe_global(&self) -> ApiResult<Vec<EntitySummary>>;

    /// Field metadata for one entity type.
    async fn describe(&self, entity: &str) -> ApiResult<EntitySchema>;

    /// Run a query and return its first page.
    async fn query(&self, query: &str) -> ApiResult<QueryPage>;

    /// Create a single record.
    async fn create(&self, entity: &str, record: &Record) -> ApiResult<SaveResult>;

    /// Create several records in one request. Results are in input order and
    /// succeed or fail independently.
    async fn create_many(&self, entity: &str, records: &[Record]) -> ApiResult<Vec<SaveResult>>;
}
