//! Resolved connections and the credential lookup that produces them.

use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::SystemConfig;
use crate::error::{MigrateError, Result};

/// Endpoint plus bearer credential for one remote system.
///
/// Immutable for the duration of a run and never written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    /// Base URL of the system (scheme and host, no API path).
    pub endpoint_url: String,
    bearer_token: String,
}

impl Connection {
    pub fn new(endpoint_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
        }
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint_url", &self.endpoint_url)
            .field("bearer_token", &"[REDACTED]")
            .finish()
    }
}

/// Source of resolved connections, keyed by system identifier.
pub trait ConnectionResolver {
    /// Resolve a system to a usable connection.
    ///
    /// Fails with a credential error when no valid, unexpired credential exists.
    fn resolve_connection(&self, system: &str) -> Result<Connection>;

    /// Identifiers of every system a connection could be resolved for.
    fn list_available_systems(&self) -> Vec<String>;
}

/// Resolver backed by the `systems` section of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredSystems {
    systems: BTreeMap<String, SystemConfig>,
}

impl ConfiguredSystems {
    pub fn new(systems: BTreeMap<String, SystemConfig>) -> Self {
        Self { systems }
    }
}

impl ConnectionResolver for ConfiguredSystems {
    fn resolve_connection(&self, system: &str) -> Result<Connection> {
        let entry = self
            .systems
            .get(system)
            .ok_or_else(|| MigrateError::credential(system, "system is not configured"))?;

        if let Some(expires_at) = entry.expires_at {
            if expires_at <= Utc::now() {
                return Err(MigrateError::credential(
                    system,
                    format!("credential expired at {}", expires_at.to_rfc3339()),
                ));
            }
        }

        let token = match (&entry.access_token, &entry.access_token_env) {
            (Some(token), _) => token.clone(),
            (None, Some(var)) => std::env::var(var).map_err(|_| {
                MigrateError::credential(
                    system,
                    format!("environment variable {} is not set", var),
                )
            })?,
            (None, None) => {
                return Err(MigrateError::credential(
                    system,
                    "no access_token or access_token_env configured",
                ))
            }
        };

        if token.trim().is_empty() {
            return Err(MigrateError::credential(system, "access token is empty"));
        }

        Ok(Connection::new(entry.endpoint_url.clone(), token))
    }

    fn list_available_systems(&self) -> Vec<String> {
        self.systems.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn system(token: Option<&str>) -> SystemConfig {
        SystemConfig {
            endpoint_url: "https://prod.example.com/".to_string(),
            access_token: token.map(str::to_string),
            access_token_env: None,
            expires_at: None,
        }
    }

    fn resolver(entries: Vec<(&str, SystemConfig)>) -> ConfiguredSystems {
        ConfiguredSystems::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_resolve_inline_token() {
        let systems = resolver(vec![("prod", system(Some("tok")))]);
        let conn = systems.resolve_connection("prod").unwrap();
        assert_eq!(conn.endpoint_url, "https://prod.example.com");
        assert_eq!(conn.bearer_token(), "tok");
    }

    #[test]
    fn test_unknown_system_is_credential_error() {
        let systems = resolver(vec![]);
        let err = systems.resolve_connection("nope").unwrap_err();
        assert!(matches!(err, MigrateError::Credential { .. }));
    }

    #[test]
    fn test_expired_credential_rejected() {
        let mut entry = system(Some("tok"));
        entry.expires_at = Some(Utc::now() - Duration::minutes(5));
        let systems = resolver(vec![("prod", entry)]);
        let err = systems.resolve_connection("prod").unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_missing_env_var_rejected() {
        let mut entry = system(None);
        entry.access_token_env = Some("RECORD_MIGRATE_TEST_UNSET_TOKEN_VAR".to_string());
        let systems = resolver(vec![("prod", entry)]);
        let err = systems.resolve_connection("prod").unwrap_err();
        assert!(err.to_string().contains("RECORD_MIGRATE_TEST_UNSET_TOKEN_VAR"));
    }

    #[test]
    fn test_empty_token_rejected() {
        let systems = resolver(vec![("prod", system(Some("  ")))]);
        assert!(systems.resolve_connection("prod").is_err());
    }

    #[test]
    fn test_list_available_systems_sorted() {
        let systems = resolver(vec![("sandbox", system(Some("a"))), ("prod", system(Some("b")))]);
        assert_eq!(systems.list_available_systems(), vec!["prod", "sandbox"]);
    }

    #[test]
    fn test_debug_redacts_token() {
        let conn = Connection::new("https://x.example.com", "super_secret_token_123");
        let debug_output = format!("{:?}", conn);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_token_123"));
    }
}
