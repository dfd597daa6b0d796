//! Todo use-case service.
//!
//! # Responsibility
//! - Expose the upward boundary: list/create/get/update/delete and
//!   mark-all-complete.
//! - Wire resolver, repository, procedure registry and batch driver to one
//!   explicitly constructed client.
//!
//! # Invariants
//! - Config is validated before any store call.
//! - All components share a single `ResourceResolver`, so database and
//!   collection handles are resolved at most once per service.

use crate::config::{Endpoint, StoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::model::item::Item;
use crate::procedure::registry::ProcedureRegistry;
use crate::repo::item_repo::{DocumentItemRepository, ItemRepository};
use crate::resolver::ResourceResolver;
use crate::service::batch_driver::{BatchCompletionDriver, MarkAllReport};
use crate::store::{open_store, open_store_in_memory, Document, DocumentStore, SqliteDocumentStore};
use log::info;
use std::sync::Arc;

/// Persistence facade for the todo application.
pub struct TodoService {
    resolver: Arc<ResourceResolver>,
    items: DocumentItemRepository,
    procedures: ProcedureRegistry,
    max_batch_rounds: u32,
}

impl TodoService {
    /// Opens the configured SQLite store and builds a service over it.
    pub fn connect(config: &StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let conn = match config.parse_endpoint()? {
            Endpoint::Memory => open_store_in_memory(),
            Endpoint::File(path) => open_store(path),
        }
        .map_err(CoreError::Connection)?;

        let store = SqliteDocumentStore::new(conn).with_budget(config.execution_budget());
        info!(
            "event=service_connect module=service status=ok database={} collection={}",
            config.database, config.collection
        );
        Self::new(Arc::new(store), config)
    }

    /// Builds a service over an existing store.
    ///
    /// Nothing is resolved until the first operation runs.
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let resolver = Arc::new(ResourceResolver::new(store, config)?);

        Ok(Self {
            items: DocumentItemRepository::new(Arc::clone(&resolver)),
            procedures: ProcedureRegistry::new(Arc::clone(&resolver)),
            resolver,
            max_batch_rounds: config.max_batch_rounds,
        })
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    pub fn list_incomplete(&self) -> CoreResult<Vec<Item>> {
        self.items.list_incomplete()
    }

    pub fn create_item(&self, item: &Item) -> CoreResult<Document> {
        self.items.create_item(item)
    }

    /// Returns `Ok(None)` when no item has this id.
    pub fn get_item(&self, id: &str) -> CoreResult<Option<Item>> {
        self.items.get_item(id)
    }

    /// Fails with `CoreError::NotFound` when the item is absent.
    pub fn update_item(&self, item: &Item) -> CoreResult<Document> {
        self.items.update_item(item)
    }

    /// Fails with `CoreError::NotFound` when the item is absent.
    pub fn delete_item(&self, id: &str) -> CoreResult<()> {
        self.items.delete_item(id)
    }

    /// Completes every incomplete item, re-invoking the procedure until the
    /// candidate set drains or `max_batch_rounds` is reached.
    pub fn mark_all_complete(&self) -> CoreResult<MarkAllReport> {
        BatchCompletionDriver::new(
            &self.resolver,
            &self.items,
            &self.procedures,
            self.max_batch_rounds,
        )
        .mark_all_complete()
    }
}
