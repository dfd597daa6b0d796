#![allow(dead_code)]

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use todo_core::store::{open_store_in_memory, CollectionHandle, DatabaseHandle, ProcedureHandle};
use todo_core::{
    Document, DocumentFilter, DocumentStore, ExecutionBudget, RequestOptions,
    SqliteDocumentStore, StoreConfig, StoreResult,
};

type ExecuteHook = Box<dyn FnOnce(&SqliteDocumentStore) + Send>;

/// Store wrapper that counts container writes and procedure calls.
///
/// `before_execute` runs a hook once, right before the given procedure
/// invocation (1-based) reaches the inner store.
pub struct CountingStore {
    pub inner: SqliteDocumentStore,
    pub database_finds: AtomicUsize,
    pub database_creates: AtomicUsize,
    pub collection_creates: AtomicUsize,
    pub procedure_creates: AtomicUsize,
    pub executions: AtomicUsize,
    before_execute: Mutex<Option<(usize, ExecuteHook)>>,
}

impl CountingStore {
    pub fn new(budget: ExecutionBudget) -> Self {
        let conn = open_store_in_memory().expect("in-memory store should open");
        Self {
            inner: SqliteDocumentStore::new(conn).with_budget(budget),
            database_finds: AtomicUsize::new(0),
            database_creates: AtomicUsize::new(0),
            collection_creates: AtomicUsize::new(0),
            procedure_creates: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
            before_execute: Mutex::new(None),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(ExecutionBudget::default())
    }

    pub fn with_write_budget(max_writes: usize) -> Self {
        Self::new(ExecutionBudget {
            max_writes_per_invocation: Some(max_writes),
        })
    }

    pub fn before_execute(
        &self,
        invocation: usize,
        hook: impl FnOnce(&SqliteDocumentStore) + Send + 'static,
    ) {
        *self.before_execute.lock().unwrap() = Some((invocation, Box::new(hook)));
    }

    pub fn before_first_execute(&self, hook: impl FnOnce(&SqliteDocumentStore) + Send + 'static) {
        self.before_execute(1, hook);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl DocumentStore for CountingStore {
    fn find_database(&self, id: &str) -> StoreResult<Option<DatabaseHandle>> {
        self.database_finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find_database(id)
    }

    fn create_database(&self, id: &str) -> StoreResult<DatabaseHandle> {
        self.database_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_database(id)
    }

    fn find_collection(
        &self,
        database: &DatabaseHandle,
        id: &str,
    ) -> StoreResult<Option<CollectionHandle>> {
        self.inner.find_collection(database, id)
    }

    fn create_collection(
        &self,
        database: &DatabaseHandle,
        id: &str,
    ) -> StoreResult<CollectionHandle> {
        self.collection_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(database, id)
    }

    fn query_documents(
        &self,
        collection: &CollectionHandle,
        filter: &DocumentFilter,
    ) -> StoreResult<Vec<Document>> {
        self.inner.query_documents(collection, filter)
    }

    fn create_document(
        &self,
        collection: &CollectionHandle,
        body: Map<String, Value>,
    ) -> StoreResult<Document> {
        self.inner.create_document(collection, body)
    }

    fn replace_document(
        &self,
        self_link: &str,
        body: Map<String, Value>,
        options: &RequestOptions,
    ) -> StoreResult<Document> {
        self.inner.replace_document(self_link, body, options)
    }

    fn delete_document(&self, self_link: &str, options: &RequestOptions) -> StoreResult<()> {
        self.inner.delete_document(self_link, options)
    }

    fn find_procedure(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> StoreResult<Option<ProcedureHandle>> {
        self.inner.find_procedure(collection, id)
    }

    fn create_procedure(
        &self,
        collection: &CollectionHandle,
        id: &str,
        body: &str,
    ) -> StoreResult<ProcedureHandle> {
        self.procedure_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_procedure(collection, id, body)
    }

    fn execute_procedure(
        &self,
        procedure: &ProcedureHandle,
        args: Vec<Value>,
    ) -> StoreResult<Value> {
        let invocation = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        let due = {
            let mut slot = self.before_execute.lock().unwrap();
            match slot.take() {
                Some((at, hook)) if at == invocation => Some(hook),
                other => {
                    *slot = other;
                    None
                }
            }
        };
        if let Some(hook) = due {
            hook(&self.inner);
        }
        self.inner.execute_procedure(procedure, args)
    }
}

pub fn test_config() -> StoreConfig {
    StoreConfig::in_memory("ToDoList", "Items")
}

pub fn body(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("fixture must be a JSON object")
}
