//! Document store collaborator contract and the SQLite-backed store.
//!
//! # Responsibility
//! - Define the store-facing calls the persistence core consumes:
//!   get/create containers, predicate queries, point writes, procedure
//!   install and execution.
//! - Provide a concrete store used by the service and by tests.
//!
//! # Invariants
//! - Creating an existing database, collection, document or procedure
//!   fails with `StoreError::Conflict`, never silently duplicates.
//! - Writes addressed by self link fail with `StoreError::NotFound` when
//!   the target is gone.
//! - An if-match precondition mismatch fails with
//!   `StoreError::PreconditionFailed`.

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod document;
pub mod migrations;
mod open;
pub mod procedure;
pub mod sqlite;

pub use document::{CollectionHandle, DatabaseHandle, Document, ProcedureHandle};
pub use open::{open_store, open_store_in_memory};
pub use procedure::{ProcedureError, ProcedureScript};
pub use sqlite::SqliteDocumentStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a document store.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// The connection lock was poisoned by a panicking writer.
    Unavailable(String),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    NotFound(String),
    Conflict(String),
    PreconditionFailed(String),
    BadRequest(String),
    InvalidData(String),
    /// The procedure raised while executing.
    Procedure(ProcedureError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::NotFound(link) => write!(f, "resource not found: {link}"),
            Self::Conflict(link) => write!(f, "resource already exists: {link}"),
            Self::PreconditionFailed(link) => write!(f, "precondition failed for {link}"),
            Self::BadRequest(message) => write!(f, "bad request: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Procedure(err) => write!(f, "procedure raised: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Procedure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Equality predicate on one top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFilter {
    pub field: String,
    pub value: Value,
}

impl DocumentFilter {
    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Per-request write options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Fail with `PreconditionFailed` unless the current etag matches.
    pub if_match: Option<String>,
}

impl RequestOptions {
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
        }
    }
}

/// Work allowed to a single procedure invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionBudget {
    /// Maximum accepted replaces per invocation; `None` is unbounded.
    pub max_writes_per_invocation: Option<usize>,
}

/// Store-facing calls consumed by the persistence core.
///
/// Implementations must be shareable across threads; callers hold them as
/// `Arc<dyn DocumentStore>`.
pub trait DocumentStore: Send + Sync {
    fn find_database(&self, id: &str) -> StoreResult<Option<DatabaseHandle>>;
    fn create_database(&self, id: &str) -> StoreResult<DatabaseHandle>;

    fn find_collection(
        &self,
        database: &DatabaseHandle,
        id: &str,
    ) -> StoreResult<Option<CollectionHandle>>;
    fn create_collection(
        &self,
        database: &DatabaseHandle,
        id: &str,
    ) -> StoreResult<CollectionHandle>;

    /// Returns matching documents in insertion order.
    fn query_documents(
        &self,
        collection: &CollectionHandle,
        filter: &DocumentFilter,
    ) -> StoreResult<Vec<Document>>;
    fn create_document(
        &self,
        collection: &CollectionHandle,
        body: Map<String, Value>,
    ) -> StoreResult<Document>;
    /// Full-document overwrite addressed by self link.
    fn replace_document(
        &self,
        self_link: &str,
        body: Map<String, Value>,
        options: &RequestOptions,
    ) -> StoreResult<Document>;
    fn delete_document(&self, self_link: &str, options: &RequestOptions) -> StoreResult<()>;

    fn find_procedure(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> StoreResult<Option<ProcedureHandle>>;
    fn create_procedure(
        &self,
        collection: &CollectionHandle,
        id: &str,
        body: &str,
    ) -> StoreResult<ProcedureHandle>;
    /// Runs an installed procedure and returns its response body.
    fn execute_procedure(
        &self,
        procedure: &ProcedureHandle,
        args: Vec<Value>,
    ) -> StoreResult<Value>;
}
