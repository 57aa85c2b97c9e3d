//! Configuration validation.

use super::{Config, TransferConfig, MAX_BATCH_SIZE, MAX_RETRIES};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    for (name, system) in &config.systems {
        if system.endpoint_url.is_empty() {
            return Err(MigrateError::Config(format!(
                "systems.{}.endpoint_url is required",
                name
            )));
        }
        if !system.endpoint_url.starts_with("https://")
            && !system.endpoint_url.starts_with("http://")
        {
            return Err(MigrateError::Config(format!(
                "systems.{}.endpoint_url must start with http:// or https://, got '{}'",
                name, system.endpoint_url
            )));
        }
    }

    let transfer = &config.transfer;
    if transfer.source.is_empty() {
        return Err(MigrateError::Config("transfer.source is required".into()));
    }
    if transfer.target.is_empty() {
        return Err(MigrateError::Config("transfer.target is required".into()));
    }
    for side in [&transfer.source, &transfer.target] {
        if !config.systems.contains_key(side) {
            return Err(MigrateError::Config(format!(
                "system '{}' is not defined under systems",
                side
            )));
        }
    }

    // Cannot migrate into the system we read from
    if transfer.source == transfer.target {
        return Err(MigrateError::Config(
            "source and target cannot be the same system".into(),
        ));
    }

    if config.client.timeout_secs == 0 {
        return Err(MigrateError::Config(
            "client.timeout_secs must be at least 1".into(),
        ));
    }

    if config.client.max_retries > MAX_RETRIES {
        return Err(MigrateError::Config(format!(
            "client.max_retries must be at most {}, got {}",
            MAX_RETRIES, config.client.max_retries
        )));
    }

    validate_transfer(transfer)
}

/// Validate the engine-facing transfer settings.
pub fn validate_transfer(transfer: &TransferConfig) -> Result<()> {
    let has_entities = !transfer.entity_types.is_empty();
    let has_query = transfer
        .custom_query
        .as_deref()
        .is_some_and(|q| !q.trim().is_empty());

    match (has_entities, has_query) {
        (true, true) => {
            return Err(MigrateError::Config(
                "transfer.entity_types and transfer.custom_query are mutually exclusive".into(),
            ))
        }
        (false, false) => {
            return Err(MigrateError::Config(
                "one of transfer.entity_types or transfer.custom_query is required".into(),
            ))
        }
        _ => {}
    }

    if transfer.entity_types.iter().any(|e| e.trim().is_empty()) {
        return Err(MigrateError::Config(
            "transfer.entity_types cannot contain empty names".into(),
        ));
    }

    if transfer.batch_size == 0 || transfer.batch_size > MAX_BATCH_SIZE {
        return Err(MigrateError::Config(format!(
            "transfer.batch_size must be between 1 and {} (the most records one create call accepts), got {}",
            MAX_BATCH_SIZE, transfer.batch_size
        )));
    }

    if let Some((entity, _)) = transfer.record_limits.iter().find(|(_, l)| **l == 0) {
        return Err(MigrateError::Config(format!(
            "transfer.record_limits.{} must be at least 1",
            entity
        )));
    }

    if let Some((entity, _)) = transfer
        .external_id_mapping
        .iter()
        .find(|(_, field)| field.trim().is_empty())
    {
        return Err(MigrateError::Config(format!(
            "transfer.external_id_mapping.{} cannot be empty",
            entity
        )));
    }

    Ok(())
}
