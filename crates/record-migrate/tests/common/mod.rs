//! In-memory remote system for engine tests.
//!
//! Understands the small query dialect the engine issues: a column list, one
//! entity after FROM, an optional `WHERE f IN (...)` or `WHERE f = v` filter
//! and an optional LIMIT. Every create call is recorded.

#![allow(dead_code)]

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use record_migrate::client::{ApiResult, Identity};
use record_migrate::{
    ApiFailure, EntitySchema, EntitySummary, FieldDescriptor, QueryPage, Record, RemoteApi,
    SaveResult,
};

/// One create or create_many call.
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub entity: String,
    pub records: Vec<Record>,
}

pub struct MockApi {
    prefix: String,
    schemas: HashMap<String, EntitySchema>,
    records: Mutex<BTreeMap<String, Vec<Record>>>,
    writes: Mutex<Vec<WriteCall>>,
    queries: Mutex<Vec<String>>,
    reject: Option<(String, String)>,
    page_size: Option<usize>,
    offline: bool,
    failing_requests: AtomicUsize,
    short_results: bool,
    next_id: AtomicUsize,
}

impl MockApi {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            schemas: HashMap::new(),
            records: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            reject: None,
            page_size: None,
            offline: false,
            failing_requests: AtomicUsize::new(0),
            short_results: false,
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_schema(mut self, schema: EntitySchema) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_records(self, entity: &str, records: Vec<Record>) -> Self {
        self.records
            .lock()
            .unwrap()
            .entry(entity.to_string())
            .or_default()
            .extend(records);
        self
    }

    /// Reject creates whose `field` equals `value`.
    pub fn rejecting(mut self, field: &str, value: &str) -> Self {
        self.reject = Some((field.to_string(), value.to_string()));
        self
    }

    /// Return at most `size` records per query, reporting the rest as pending.
    pub fn paged(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Fail the next `count` create requests as a whole.
    pub fn failing_requests(self, count: usize) -> Self {
        self.failing_requests.store(count, Ordering::SeqCst);
        self
    }

    /// Answer create_many with one result fewer than records sent.
    pub fn short_results(mut self) -> Self {
        self.short_results = true;
        self
    }

    pub fn write_calls(&self) -> Vec<WriteCall> {
        self.writes.lock().unwrap().clone()
    }

    /// Every payload sent for `entity`, in write order.
    pub fn written(&self, entity: &str) -> Vec<Record> {
        self.write_calls()
            .into_iter()
            .filter(|c| c.entity == entity)
            .flat_map(|c| c.records)
            .collect()
    }

    /// Records currently stored for `entity`.
    pub fn stored(&self, entity: &str) -> Vec<Record> {
        self.records
            .lock()
            .unwrap()
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn save(&self, entity: &str, record: &Record) -> SaveResult {
        if let Some((field, value)) = &self.reject {
            if record.get_str(field) == Some(value.as_str()) {
                return SaveResult::failed(ApiFailure::structured(
                    format!("{} is not allowed", value),
                    Some("FIELD_CUSTOM_VALIDATION_EXCEPTION"),
                    vec![field.clone()],
                ));
            }
        }
        let id = format!(
            "{}{:04}",
            self.prefix,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        );
        self.records
            .lock()
            .unwrap()
            .entry(entity.to_string())
            .or_default()
            .push(record.clone().with("Id", id.as_str()));
        SaveResult::created(id)
    }

    fn check_request(&self) -> ApiResult<()> {
        let pending = self.failing_requests.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_requests.store(pending - 1, Ordering::SeqCst);
            return Err(ApiFailure::Http {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn check_online(&self) -> ApiResult<()> {
        if self.offline {
            Err(ApiFailure::Http {
                status: 401,
                message: "Session expired or invalid".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn unquote(literal: &str) -> String {
    let literal = literal.trim();
    match literal.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("\\'", "'").replace("\\\\", "\\"),
        None => literal.to_string(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn split_literals(list: &str) -> Vec<String> {
    let literal = Regex::new(r"'(?:[^'\\]|\\.)*'|[^,\s]+").unwrap();
    literal
        .find_iter(list)
        .map(|m| unquote(m.as_str()))
        .collect()
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn identity(&self) -> ApiResult<Identity> {
        self.check_online()?;
        Ok(Identity {
            display_name: Some(format!("{} user", self.prefix)),
        })
    }

    async fn describe_global(&self) -> ApiResult<Vec<EntitySummary>> {
        self.check_online()?;
        let mut names: Vec<&String> = self.schemas.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| EntitySummary {
                name: name.clone(),
                custom: name.ends_with("__c"),
                queryable: true,
                creatable: true,
            })
            .collect())
    }

    async fn describe(&self, entity: &str) -> ApiResult<EntitySchema> {
        self.check_online()?;
        self.schemas.get(entity).cloned().ok_or_else(|| {
            ApiFailure::structured(
                format!("The requested resource does not exist: {}", entity),
                Some("NOT_FOUND"),
                vec![],
            )
        })
    }

    async fn query(&self, query: &str) -> ApiResult<QueryPage> {
        self.check_online()?;
        self.queries.lock().unwrap().push(query.to_string());

        let shape = Regex::new(r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+([A-Za-z_][A-Za-z0-9_]*)(.*)$")
            .unwrap();
        let Some(caps) = shape.captures(query) else {
            return Err(ApiFailure::structured(
                "unexpected token",
                Some("MALFORMED_QUERY"),
                vec![],
            ));
        };
        let columns: Vec<String> = caps[1].split(',').map(|c| c.trim().to_string()).collect();
        let entity = caps[2].to_string();
        let rest = caps[3].to_string();

        let in_filter = Regex::new(r"(?i)WHERE\s+(\w+)\s+IN\s*\(([^)]*)\)").unwrap();
        let eq_filter = Regex::new(r"(?i)WHERE\s+(\w+)\s*=\s*('(?:[^'\\]|\\.)*'|[\w.-]+)").unwrap();
        let limit = Regex::new(r"(?i)LIMIT\s+(\d+)").unwrap();

        let filter: Option<(String, Vec<String>)> = if let Some(c) = in_filter.captures(&rest) {
            Some((c[1].to_string(), split_literals(&c[2])))
        } else {
            eq_filter
                .captures(&rest)
                .map(|c| (c[1].to_string(), vec![unquote(&c[2])]))
        };
        let limit: Option<usize> = limit.captures(&rest).and_then(|c| c[1].parse().ok());

        let mut matching: Vec<Record> = self
            .stored(&entity)
            .into_iter()
            .filter(|record| match &filter {
                Some((field, values)) => record
                    .get(field)
                    .and_then(value_text)
                    .is_some_and(|v| values.contains(&v)),
                None => true,
            })
            .map(|record| record.filtered(|name, _| columns.iter().any(|c| c == name)))
            .collect();
        if let Some(limit) = limit {
            matching.truncate(limit);
        }

        let total_size = matching.len() as u64;
        let done = match self.page_size {
            Some(size) if matching.len() > size => {
                matching.truncate(size);
                false
            }
            _ => true,
        };
        Ok(QueryPage {
            records: matching,
            total_size,
            done,
        })
    }

    async fn create(&self, entity: &str, record: &Record) -> ApiResult<SaveResult> {
        self.check_online()?;
        self.writes.lock().unwrap().push(WriteCall {
            entity: entity.to_string(),
            records: vec![record.clone()],
        });
        self.check_request()?;
        Ok(self.save(entity, record))
    }

    async fn create_many(&self, entity: &str, records: &[Record]) -> ApiResult<Vec<SaveResult>> {
        self.check_online()?;
        self.writes.lock().unwrap().push(WriteCall {
            entity: entity.to_string(),
            records: records.to_vec(),
        });
        self.check_request()?;
        let saved = if self.short_results {
            &records[..records.len().saturating_sub(1)]
        } else {
            records
        };
        Ok(saved.iter().map(|r| self.save(entity, r)).collect())
    }
}

pub fn field(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        name: name.to_string(),
        field_type: "string".to_string(),
        creatable: true,
        updateable: true,
        reference_targets: Vec::new(),
        relationship_name: None,
        is_external_id: false,
        is_calculated: false,
    }
}

pub fn system_field(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        creatable: false,
        updateable: false,
        ..field(name)
    }
}

pub fn external_id(name: &str) -> FieldDescriptor {
    FieldDescriptor {
        is_external_id: true,
        ..field(name)
    }
}

pub fn reference(name: &str, target: &str, relationship: &str) -> FieldDescriptor {
    FieldDescriptor {
        field_type: "reference".to_string(),
        reference_targets: vec![target.to_string()],
        relationship_name: Some(relationship.to_string()),
        ..field(name)
    }
}

/// Lead: no reference fields.
pub fn lead_schema() -> EntitySchema {
    EntitySchema {
        name: "Lead".to_string(),
        fields: vec![
            system_field("Id"),
            field("LastName"),
            field("Company"),
            system_field("CreatedDate"),
            system_field("OwnerId"),
        ],
    }
}

/// Account: self-reference through ParentId and an external id field.
pub fn account_schema() -> EntitySchema {
    EntitySchema {
        name: "Account".to_string(),
        fields: vec![
            system_field("Id"),
            field("Name"),
            external_id("Ext_Id__c"),
            reference("ParentId", "Account", "Parent"),
            system_field("LastModifiedDate"),
        ],
    }
}

/// Contact: references Account.
pub fn contact_schema() -> EntitySchema {
    EntitySchema {
        name: "Contact".to_string(),
        fields: vec![
            system_field("Id"),
            field("LastName"),
            reference("AccountId", "Account", "Account"),
            system_field("CreatedDate"),
        ],
    }
}

pub fn leads(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|n| {
            Record::new()
                .with("Id", format!("00QS{:04}", n))
                .with("LastName", format!("Lead {}", n))
                .with("Company", "Acme")
                .with("CreatedDate", "2024-01-01T00:00:00.000+0000")
                .with("OwnerId", "005S0001")
        })
        .collect()
}

pub fn account(id: &str, name: &str, ext: &str) -> Record {
    Record::new()
        .with("Id", id)
        .with("Name", name)
        .with("Ext_Id__c", ext)
        .with("ParentId", "001S9999")
        .with("LastModifiedDate", "2024-01-01T00:00:00.000+0000")
}

pub fn contact(id: &str, last_name: &str, account_id: &str) -> Record {
    Record::new()
        .with("Id", id)
        .with("LastName", last_name)
        .with("AccountId", account_id)
        .with("CreatedDate", "2024-01-01T00:00:00.000+0000")
}
