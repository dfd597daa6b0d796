//! Store connection and resource configuration.
//!
//! # Responsibility
//! - Load `endpoint`, `authKey`, `database` and `collection` settings from
//!   the environment or a JSON file.
//! - Fail fast on missing or malformed values before any store call.
//!
//! # Invariants
//! - A validated config always names a non-empty database and collection.
//! - `auth_key` is never printed; `Debug` redacts it.

use crate::store::ExecutionBudget;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_ENDPOINT: &str = "TODO_STORE_ENDPOINT";
pub const ENV_AUTH_KEY: &str = "TODO_STORE_AUTH_KEY";
pub const ENV_DATABASE: &str = "TODO_STORE_DATABASE";
pub const ENV_COLLECTION: &str = "TODO_STORE_COLLECTION";
pub const ENV_MAX_BATCH_ROUNDS: &str = "TODO_STORE_MAX_BATCH_ROUNDS";
pub const ENV_PROCEDURE_WRITE_BUDGET: &str = "TODO_STORE_PROCEDURE_WRITE_BUDGET";

/// Upper bound on procedure invocations per `mark_all_complete` call.
pub const DEFAULT_MAX_BATCH_ROUNDS: u32 = 16;

const MEMORY_ENDPOINT: &str = "sqlite::memory:";
const FILE_ENDPOINT_PREFIX: &str = "sqlite://";

static RESOURCE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^/\\?#\s](?:[^/\\?#]*[^/\\?#\s])?$").expect("valid name regex"));

/// Configuration error. Always fatal; never retried.
#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, message: String },
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required setting `{key}`"),
            Self::Invalid { key, message } => write!(f, "invalid setting `{key}`: {message}"),
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Where the document store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Memory,
    File(PathBuf),
}

/// Settings for one store client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// `sqlite::memory:` or `sqlite://<path>`.
    pub endpoint: String,
    pub auth_key: String,
    pub database: String,
    pub collection: String,
    #[serde(default = "default_max_batch_rounds")]
    pub max_batch_rounds: u32,
    /// Accepted replaces per procedure invocation; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_write_budget: Option<usize>,
}

impl Debug for StoreConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_key", &"<redacted>")
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("max_batch_rounds", &self.max_batch_rounds)
            .field("procedure_write_budget", &self.procedure_write_budget)
            .finish()
    }
}

impl StoreConfig {
    pub fn new(
        endpoint: impl Into<String>,
        auth_key: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_key: auth_key.into(),
            database: database.into(),
            collection: collection.into(),
            max_batch_rounds: DEFAULT_MAX_BATCH_ROUNDS,
            procedure_write_budget: None,
        }
    }

    /// Config for a private in-memory store.
    pub fn in_memory(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::new(MEMORY_ENDPOINT, "local", database, collection)
    }

    /// Loads and validates settings from `TODO_STORE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads and validates settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let mut config = Self::new(
            required(ENV_ENDPOINT)?,
            required(ENV_AUTH_KEY)?,
            required(ENV_DATABASE)?,
            required(ENV_COLLECTION)?,
        );
        if let Some(value) = lookup(ENV_MAX_BATCH_ROUNDS) {
            config.max_batch_rounds = parse_number(ENV_MAX_BATCH_ROUNDS, &value)?;
        }
        if let Some(value) = lookup(ENV_PROCEDURE_WRITE_BUDGET) {
            config.procedure_write_budget = Some(parse_number(ENV_PROCEDURE_WRITE_BUDGET, &value)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads and validates settings from a camelCase JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every setting; the first failure wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse_endpoint()?;
        if self.auth_key.trim().is_empty() {
            return Err(ConfigError::Missing("authKey"));
        }
        validate_resource_name("database", &self.database)?;
        validate_resource_name("collection", &self.collection)?;
        if self.max_batch_rounds == 0 {
            return Err(ConfigError::Invalid {
                key: "maxBatchRounds",
                message: "must be at least 1".to_string(),
            });
        }
        if self.procedure_write_budget == Some(0) {
            return Err(ConfigError::Invalid {
                key: "procedureWriteBudget",
                message: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn parse_endpoint(&self) -> Result<Endpoint, ConfigError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Missing("endpoint"));
        }
        if endpoint == MEMORY_ENDPOINT {
            return Ok(Endpoint::Memory);
        }
        match endpoint.strip_prefix(FILE_ENDPOINT_PREFIX) {
            Some(path) if !path.is_empty() => Ok(Endpoint::File(PathBuf::from(path))),
            _ => Err(ConfigError::Invalid {
                key: "endpoint",
                message: format!(
                    "expected `{MEMORY_ENDPOINT}` or `{FILE_ENDPOINT_PREFIX}<path>`, got `{endpoint}`"
                ),
            }),
        }
    }

    pub fn execution_budget(&self) -> ExecutionBudget {
        ExecutionBudget {
            max_writes_per_invocation: self.procedure_write_budget,
        }
    }
}

fn default_max_batch_rounds() -> u32 {
    DEFAULT_MAX_BATCH_ROUNDS
}

fn validate_resource_name(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    if !RESOURCE_NAME_RE.is_match(value) {
        return Err(ConfigError::Invalid {
            key,
            message: format!(
                "`{value}` must not contain `/`, `\\`, `?`, `#` or surrounding whitespace"
            ),
        });
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        message: format!("`{value}` is not a valid number: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, Endpoint, StoreConfig, ENV_AUTH_KEY, ENV_COLLECTION, ENV_DATABASE,
        ENV_ENDPOINT, ENV_MAX_BATCH_ROUNDS, ENV_PROCEDURE_WRITE_BUDGET,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_ENDPOINT, "sqlite:///var/lib/todo/store.db"),
            (ENV_AUTH_KEY, "secret"),
            (ENV_DATABASE, "ToDoList"),
            (ENV_COLLECTION, "Items"),
        ]
    }

    #[test]
    fn from_lookup_reads_required_and_optional_settings() {
        let mut pairs = base();
        pairs.push((ENV_MAX_BATCH_ROUNDS, "4"));
        pairs.push((ENV_PROCEDURE_WRITE_BUDGET, "100"));

        let config = StoreConfig::from_lookup(lookup(&pairs)).expect("config should load");
        assert_eq!(config.database, "ToDoList");
        assert_eq!(config.max_batch_rounds, 4);
        assert_eq!(config.procedure_write_budget, Some(100));
        assert_eq!(
            config.parse_endpoint().unwrap(),
            Endpoint::File(PathBuf::from("/var/lib/todo/store.db"))
        );
    }

    #[test]
    fn missing_collection_is_fatal() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(key, _)| *key != ENV_COLLECTION)
            .collect();
        let err = StoreConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_COLLECTION)));
    }

    #[test]
    fn reserved_characters_in_names_are_rejected() {
        let mut config = StoreConfig::in_memory("todo", "items");
        assert!(config.validate().is_ok());

        config.collection = "items/archive".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "collection", .. })
        ));

        config.collection = " items".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_endpoint_scheme_is_rejected() {
        let mut config = StoreConfig::in_memory("todo", "items");
        config.endpoint = "https://example.documents.azure.com:443/".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "endpoint", .. })
        ));
    }

    #[test]
    fn json_file_uses_camel_case_keys_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"endpoint":"sqlite::memory:","authKey":"k","database":"todo","collection":"items"}"#,
        )
        .unwrap();

        let config = StoreConfig::from_json_file(&path).expect("json config should load");
        assert_eq!(config.parse_endpoint().unwrap(), Endpoint::Memory);
        assert_eq!(config.max_batch_rounds, super::DEFAULT_MAX_BATCH_ROUNDS);
        assert!(config.procedure_write_budget.is_none());
    }

    #[test]
    fn debug_output_redacts_auth_key() {
        let config = StoreConfig::new("sqlite::memory:", "super-secret", "todo", "items");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
