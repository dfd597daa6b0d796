//! Database and collection resolution.
//!
//! # Responsibility
//! - Get-or-create the configured database and collection on first use.
//! - Memoize both handles for the lifetime of the resolver.
//!
//! # Invariants
//! - Each handle is resolved at most once per resolver; later calls are
//!   lock-free reads.
//! - A concurrent creator winning the race (`Conflict` on create) counts as
//!   success: the existing resource is re-read and returned.
//! - Lookup failures propagate as `CoreError::Connection`; create failures
//!   other than `Conflict` propagate as `CoreError::Install`.

use crate::config::{ConfigError, StoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::store::{CollectionHandle, DatabaseHandle, DocumentStore, StoreError, StoreResult};
use log::{info, warn};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Client-side owner of the store connection and the memoized handles.
///
/// Construct once and share via `Arc`; every component resolves through
/// the same instance.
pub struct ResourceResolver {
    store: Arc<dyn DocumentStore>,
    database_id: String,
    collection_id: String,
    database: OnceCell<DatabaseHandle>,
    collection: OnceCell<CollectionHandle>,
}

impl ResourceResolver {
    /// Creates a resolver for the config's database and collection.
    ///
    /// No store call is made until a handle is first requested.
    pub fn new(store: Arc<dyn DocumentStore>, config: &StoreConfig) -> CoreResult<Self> {
        Self::with_names(store, &config.database, &config.collection)
    }

    pub fn with_names(
        store: Arc<dyn DocumentStore>,
        database_id: &str,
        collection_id: &str,
    ) -> CoreResult<Self> {
        if database_id.trim().is_empty() {
            return Err(ConfigError::Missing("database").into());
        }
        if collection_id.trim().is_empty() {
            return Err(ConfigError::Missing("collection").into());
        }

        Ok(Self {
            store,
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
            database: OnceCell::new(),
            collection: OnceCell::new(),
        })
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Returns the memoized database handle, resolving it on first call.
    pub fn database(&self) -> CoreResult<&DatabaseHandle> {
        self.database
            .get_or_try_init(|| resolve_database(self.store(), &self.database_id))
    }

    /// Returns the memoized collection handle, resolving the database first
    /// when needed.
    pub fn collection(&self) -> CoreResult<&CollectionHandle> {
        self.collection.get_or_try_init(|| {
            let database = self.database()?;
            resolve_collection(self.store(), database, &self.collection_id)
        })
    }
}

/// Get-or-create a database by name. Not memoized.
pub fn resolve_database(store: &dyn DocumentStore, name: &str) -> CoreResult<DatabaseHandle> {
    get_or_create(
        "database",
        || store.find_database(name),
        || store.create_database(name),
    )
}

/// Get-or-create a collection by name within `database`. Not memoized.
pub fn resolve_collection(
    store: &dyn DocumentStore,
    database: &DatabaseHandle,
    name: &str,
) -> CoreResult<CollectionHandle> {
    get_or_create(
        "collection",
        || store.find_collection(database, name),
        || store.create_collection(database, name),
    )
}

/// Shared get-or-create protocol for store resources.
pub(crate) fn get_or_create<T>(
    kind: &'static str,
    find: impl Fn() -> StoreResult<Option<T>>,
    create: impl FnOnce() -> StoreResult<T>,
) -> CoreResult<T> {
    if let Some(existing) = find().map_err(CoreError::Connection)? {
        info!("event=resource_resolve module=resolver status=ok kind={kind} outcome=found");
        return Ok(existing);
    }

    match create() {
        Ok(created) => {
            info!("event=resource_resolve module=resolver status=ok kind={kind} outcome=created");
            Ok(created)
        }
        Err(StoreError::Conflict(link)) => {
            warn!("event=resource_resolve module=resolver status=retry kind={kind} outcome=create_race");
            find()
                .map_err(CoreError::Connection)?
                .ok_or(CoreError::Install {
                    resource: kind.to_string(),
                    source: StoreError::Conflict(link),
                })
        }
        Err(source) => Err(CoreError::Install {
            resource: kind.to_string(),
            source,
        }),
    }
}
