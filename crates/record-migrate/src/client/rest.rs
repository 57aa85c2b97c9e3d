//! REST implementation of [`RemoteApi`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ApiFailure, ApiResult, EntitySummary, Identity, QueryPage, RemoteApi, SaveResult};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;
use crate::record::{Record, ATTRIBUTES_FIELD};
use crate::schema::EntitySchema;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 500;

/// Longest single wait between retries
const MAX_BACKOFF_MS: u64 = 30_000;

/// Delay before retry number `attempt + 1`.
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(INITIAL_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Check if an HTTP status code is worth retrying
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

/// Client for one remote system's REST API.
pub struct RestClient {
    http: Client,
    base_url: String,
    bearer_token: String,
    max_retries: u32,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GlobalDescribe {
    #[serde(default)]
    sobjects: Vec<EntitySummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    total_size: u64,
    #[serde(default = "default_done")]
    done: bool,
    #[serde(default)]
    records: Vec<Value>,
}

fn default_done() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireError {
    #[serde(default)]
    message: String,
    #[serde(default, alias = "statusCode")]
    error_code: Option<String>,
    #[serde(default)]
    fields: Vec<String>,
}

impl From<WireError> for ApiFailure {
    fn from(err: WireError) -> Self {
        ApiFailure::Structured {
            message: err.message,
            status_code: err.error_code,
            fields: err.fields,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSaveResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<WireError>,
}

impl From<WireSaveResult> for SaveResult {
    fn from(result: WireSaveResult) -> Self {
        SaveResult {
            id: result.id,
            success: result.success,
            errors: result.errors.into_iter().map(ApiFailure::from).collect(),
        }
    }
}

impl RestClient {
    /// Build a client for a resolved connection.
    pub fn new(connection: &Connection, config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: format!(
                "{}/services/data/v{}",
                connection.endpoint_url, config.api_version
            ),
            bearer_token: connection.bearer_token().to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Versioned API root this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.bearer_token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// GET with retry on transient failures.
    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<Value> {
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            debug!("GET {} (attempt {})", url, attempt + 1);
            let response = self
                .authorized(self.http.get(&url).query(query))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<Value>().await.map_err(transport_failure);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if is_retryable_status(status) && attempt < self.max_retries {
                        warn!("GET {} returned {}, retrying", url, status);
                    } else {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(parse_error_body(status, &body));
                    }
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    warn!("GET {} failed ({}), retrying", url, e);
                }
                Err(e) => return Err(transport_failure(e)),
            }

            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    /// POST once. Creates are not retried.
    async fn post_json(&self, path: &str, body: &Value) -> ApiResult<Value> {
        let url = self.url(path);
        debug!("POST {}", url);

        let resp = self
            .authorized(self.http.post(&url).json(body))
            .send()
            .await
            .map_err(transport_failure)?;

        let status = resp.status();
        if status.is_success() {
            resp.json::<Value>().await.map_err(transport_failure)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(parse_error_body(status, &body))
        }
    }
}

fn transport_failure(err: reqwest::Error) -> ApiFailure {
    match err.status() {
        Some(status) => ApiFailure::Http {
            status: status.as_u16(),
            message: err.to_string(),
        },
        None => ApiFailure::Message(err.to_string()),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> ApiResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ApiFailure::Message(format!("Unexpected {} response: {}", what, e)))
}

/// Turn an error response body into an [`ApiFailure`].
///
/// The platform returns either a list of `{message, errorCode, fields}`
/// objects or a single such object; anything else is kept as raw text.
pub(crate) fn parse_error_body(status: StatusCode, body: &str) -> ApiFailure {
    if let Ok(errors) = serde_json::from_str::<Vec<WireError>>(body) {
        let mut failures: Vec<ApiFailure> = errors
            .into_iter()
            .filter(|e| !e.message.is_empty())
            .map(ApiFailure::from)
            .collect();
        match failures.len() {
            0 => {}
            1 => return failures.remove(0),
            _ => return ApiFailure::Many(failures),
        }
    }

    if let Ok(error) = serde_json::from_str::<WireError>(body) {
        if !error.message.is_empty() {
            return error.into();
        }
    }

    ApiFailure::Http {
        status: status.as_u16(),
        message: body.trim().to_string(),
    }
}

fn strip_attributes(value: Value) -> Option<Record> {
    Record::from_value(value).map(|record| record.filtered(|name, _| name != ATTRIBUTES_FIELD))
}

#[async_trait]
impl RemoteApi for RestClient {
    async fn identity(&self) -> ApiResult<Identity> {
        let value = self.get_json("/", &[]).await?;
        let display_name = value
            .get("identity")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Identity { display_name })
    }

    async fn describe_global(&self) -> ApiResult<Vec<EntitySummary>> {
        let value = self.get_json("/sobjects", &[]).await?;
        let global: GlobalDescribe = decode(value, "describe")?;
        Ok(global.sobjects)
    }

    async fn describe(&self, entity: &str) -> ApiResult<EntitySchema> {
        let value = self
            .get_json(&format!("/sobjects/{}/describe", entity), &[])
            .await?;
        decode(value, "describe")
    }

    async fn query(&self, query: &str) -> ApiResult<QueryPage> {
        let value = self.get_json("/query", &[("q", query)]).await?;
        let response: QueryResponse = decode(value, "query")?;
        Ok(QueryPage {
            records: response
                .records
                .into_iter()
                .filter_map(strip_attributes)
                .collect(),
            total_size: response.total_size,
            done: response.done,
        })
    }

    async fn create(&self, entity: &str, record: &Record) -> ApiResult<SaveResult> {
        let body = Value::Object(record.as_map().clone());
        let value = self
            .post_json(&format!("/sobjects/{}", entity), &body)
            .await?;
        let result: WireSaveResult = decode(value, "create")?;
        Ok(result.into())
    }

    async fn create_many(&self, entity: &str, records: &[Record]) -> ApiResult<Vec<SaveResult>> {
        let payload: Vec<Value> = records
            .iter()
            .map(|record| {
                let mut fields = record.as_map().clone();
                fields.insert(ATTRIBUTES_FIELD.to_string(), json!({ "type": entity }));
                Value::Object(fields)
            })
            .collect();

        let body = json!({ "allOrNone": false, "records": payload });
        let value = self.post_json("/composite/sobjects", &body).await?;
        let results: Vec<WireSaveResult> = decode(value, "composite create")?;

        if results.len() != records.len() {
            return Err(ApiFailure::Message(format!(
                "Composite create returned {} results for {} records",
                results.len(),
                records.len()
            )));
        }
        Ok(results.into_iter().map(SaveResult::from).collect())
    }
}
