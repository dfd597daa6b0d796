//! Persistence core for the todo application.
//!
//! Resolves a database and collection in a document store, performs item
//! CRUD, and completes all open items through a server-side procedure.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod procedure;
pub mod repo;
pub mod resolver;
pub mod service;
pub mod store;

pub use config::{ConfigError, Endpoint, StoreConfig};
pub use error::{BatchError, CoreError, CoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::item::{Item, ItemValidationError};
pub use procedure::registry::ProcedureRegistry;
pub use procedure::MARK_ALL_PROCEDURE_ID;
pub use repo::item_repo::{DocumentItemRepository, ItemRepository};
pub use resolver::ResourceResolver;
pub use service::batch_driver::{BatchCompletionDriver, MarkAllReport};
pub use service::todo_service::TodoService;
pub use store::{
    Document, DocumentFilter, DocumentStore, ExecutionBudget, RequestOptions,
    SqliteDocumentStore, StoreError, StoreResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
