//! Item repository contract and document-store implementation.
//!
//! # Responsibility
//! - Provide point CRUD for items against the resolved collection.
//! - Expose raw documents where callers need store links and etags.
//!
//! # Invariants
//! - Write paths call `Item::validate()` before any store call.
//! - Update and delete look the document up first, then mutate with the
//!   observed etag as an if-match precondition. The two calls are not
//!   transactional: a delete in between surfaces as `NotFound`, a
//!   modification in between as `Conflict`.
//! - Replace is a full-document overwrite.

use crate::error::{CoreError, CoreResult};
use crate::model::item::{Item, COMPLETED_FIELD};
use crate::resolver::ResourceResolver;
use crate::store::{Document, DocumentFilter, RequestOptions, StoreError};
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Repository interface for item CRUD.
pub trait ItemRepository {
    /// Items whose completion flag is `false`, in insertion order.
    fn list_incomplete(&self) -> CoreResult<Vec<Item>>;
    /// Raw form of [`ItemRepository::list_incomplete`].
    fn list_incomplete_documents(&self) -> CoreResult<Vec<Document>>;
    fn get_item(&self, id: &str) -> CoreResult<Option<Item>>;
    fn get_document(&self, id: &str) -> CoreResult<Option<Document>>;
    fn create_item(&self, item: &Item) -> CoreResult<Document>;
    fn update_item(&self, item: &Item) -> CoreResult<Document>;
    fn delete_item(&self, id: &str) -> CoreResult<()>;
}

/// Item repository over the resolver's collection.
pub struct DocumentItemRepository {
    resolver: Arc<ResourceResolver>,
}

impl DocumentItemRepository {
    pub fn new(resolver: Arc<ResourceResolver>) -> Self {
        Self { resolver }
    }

    fn query(&self, filter: &DocumentFilter) -> CoreResult<Vec<Document>> {
        let collection = self.resolver.collection()?;
        self.resolver
            .store()
            .query_documents(collection, filter)
            .map_err(CoreError::Connection)
    }

    /// Looks up the raw document or fails with `NotFound(id)`.
    fn require_document(&self, id: &str) -> CoreResult<Document> {
        self.get_document(id)?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }
}

impl ItemRepository for DocumentItemRepository {
    fn list_incomplete(&self) -> CoreResult<Vec<Item>> {
        self.list_incomplete_documents()?
            .into_iter()
            .map(document_to_item)
            .collect()
    }

    fn list_incomplete_documents(&self) -> CoreResult<Vec<Document>> {
        self.query(&DocumentFilter::field_eq(COMPLETED_FIELD, false))
    }

    fn get_item(&self, id: &str) -> CoreResult<Option<Item>> {
        self.get_document(id)?.map(document_to_item).transpose()
    }

    fn get_document(&self, id: &str) -> CoreResult<Option<Document>> {
        Ok(self
            .query(&DocumentFilter::field_eq("id", id))?
            .into_iter()
            .next())
    }

    fn create_item(&self, item: &Item) -> CoreResult<Document> {
        item.validate()?;
        let collection = self.resolver.collection()?;

        let document = self
            .resolver
            .store()
            .create_document(collection, item_to_body(item)?)
            .map_err(|err| write_error(&item.id, err))?;

        debug!("event=item_create module=repo status=ok");
        Ok(document)
    }

    fn update_item(&self, item: &Item) -> CoreResult<Document> {
        item.validate()?;
        let current = self.require_document(&item.id)?;
        let (self_link, options) = mutation_target(&current)?;

        let document = self
            .resolver
            .store()
            .replace_document(self_link, item_to_body(item)?, &options)
            .map_err(|err| write_error(&item.id, err))?;

        debug!("event=item_update module=repo status=ok");
        Ok(document)
    }

    fn delete_item(&self, id: &str) -> CoreResult<()> {
        let current = self.require_document(id)?;
        let (self_link, options) = mutation_target(&current)?;

        self.resolver
            .store()
            .delete_document(self_link, &options)
            .map_err(|err| write_error(id, err))?;

        debug!("event=item_delete module=repo status=ok");
        Ok(())
    }
}

/// Decodes a stored document into an item, ignoring system properties.
pub fn document_to_item(document: Document) -> CoreResult<Item> {
    let id = document.id().unwrap_or("<missing>").to_string();
    serde_json::from_value(Value::Object(document.into_user_fields()))
        .map_err(|err| CoreError::InvalidData(format!("document `{id}`: {err}")))
}

fn item_to_body(item: &Item) -> CoreResult<Map<String, Value>> {
    match serde_json::to_value(item) {
        Ok(Value::Object(body)) => Ok(body),
        Ok(_) => Err(CoreError::InvalidData(format!(
            "item `{}` did not serialize to an object",
            item.id
        ))),
        Err(err) => Err(CoreError::InvalidData(format!("item `{}`: {err}", item.id))),
    }
}

fn mutation_target(document: &Document) -> CoreResult<(&str, RequestOptions)> {
    let self_link = document.self_link().ok_or_else(|| {
        CoreError::InvalidData(format!(
            "document `{}` has no self link",
            document.id().unwrap_or("<missing>")
        ))
    })?;
    let options = document
        .etag()
        .map(RequestOptions::if_match)
        .unwrap_or_default();
    Ok((self_link, options))
}

/// Maps store write failures to item-level kinds keyed by item id.
fn write_error(id: &str, err: StoreError) -> CoreError {
    match err {
        StoreError::NotFound(_) => CoreError::NotFound(id.to_string()),
        StoreError::Conflict(_) | StoreError::PreconditionFailed(_) => {
            CoreError::Conflict(id.to_string())
        }
        other => CoreError::from(other),
    }
}
