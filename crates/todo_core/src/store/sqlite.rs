//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist databases, collections, JSON documents and procedures.
//! - Stamp system properties (`_rid`, `_self`, `_etag`, `_ts`, `_seq`) on
//!   every write and expose them on every read.
//! - Execute installed procedures under the configured `ExecutionBudget`.
//!
//! # Invariants
//! - One connection, serialized behind a mutex; a procedure invocation holds
//!   the lock for its whole run, so its replaces are never interleaved with
//!   other writers.
//! - `_seq` comes from a single store-wide counter and strictly increases
//!   with every document write.
//! - Acknowledged procedure writes are committed individually; a later
//!   failure in the same invocation does not roll them back.
//! - Procedures only write documents of the collection they are installed on.

use super::document::{
    strip_system_properties, CollectionHandle, DatabaseHandle, Document, ProcedureHandle,
    ETAG_PROPERTY, RID_PROPERTY, SELF_LINK_PROPERTY, SEQUENCE_PROPERTY, TIMESTAMP_PROPERTY,
};
use super::procedure::{execute_script, ProcedureContext, ProcedureScript, ReplaceOutcome};
use super::{
    DocumentFilter, DocumentStore, ExecutionBudget, RequestOptions, StoreError, StoreResult,
};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use uuid::Uuid;

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid field name regex"));

const DOCUMENT_SELECT_SQL: &str = "SELECT self_link, rid, body, etag, ts, seq FROM documents";

/// Document store over one SQLite connection.
///
/// Connections must come from [`crate::store::open_store`] or
/// [`crate::store::open_store_in_memory`] so migrations are applied.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    budget: ExecutionBudget,
}

impl SqliteDocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            budget: ExecutionBudget::default(),
        }
    }

    /// Limits the work accepted by each procedure invocation.
    pub fn with_budget(mut self, budget: ExecutionBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> ExecutionBudget {
        self.budget
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn find_database(&self, id: &str) -> StoreResult<Option<DatabaseHandle>> {
        let conn = self.lock()?;
        let handle = conn
            .query_row(
                "SELECT id, rid, self_link FROM databases WHERE id = ?1;",
                [id],
                |row| {
                    Ok(DatabaseHandle {
                        id: row.get(0)?,
                        rid: row.get(1)?,
                        self_link: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(handle)
    }

    fn create_database(&self, id: &str) -> StoreResult<DatabaseHandle> {
        require_resource_id(id, "database")?;
        let conn = self.lock()?;
        let handle = DatabaseHandle {
            id: id.to_string(),
            rid: new_rid(),
            self_link: format!("dbs/{id}"),
        };

        conn.execute(
            "INSERT INTO databases (id, rid, self_link) VALUES (?1, ?2, ?3);",
            params![handle.id, handle.rid, handle.self_link],
        )
        .map_err(|err| conflict_or(err, &handle.self_link))?;

        info!("event=store_create module=store status=ok kind=database");
        Ok(handle)
    }

    fn find_collection(
        &self,
        database: &DatabaseHandle,
        id: &str,
    ) -> StoreResult<Option<CollectionHandle>> {
        let conn = self.lock()?;
        let handle = conn
            .query_row(
                "SELECT id, rid, self_link FROM collections WHERE database_id = ?1 AND id = ?2;",
                params![database.id, id],
                |row| {
                    Ok(CollectionHandle {
                        id: row.get(0)?,
                        rid: row.get(1)?,
                        self_link: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(handle)
    }

    fn create_collection(
        &self,
        database: &DatabaseHandle,
        id: &str,
    ) -> StoreResult<CollectionHandle> {
        require_resource_id(id, "collection")?;
        let conn = self.lock()?;
        if !row_exists(&conn, "SELECT 1 FROM databases WHERE id = ?1;", &database.id)? {
            return Err(StoreError::NotFound(database.self_link.clone()));
        }

        let handle = CollectionHandle {
            id: id.to_string(),
            rid: new_rid(),
            self_link: format!("{}/colls/{id}", database.self_link),
        };
        conn.execute(
            "INSERT INTO collections (database_id, id, rid, self_link) VALUES (?1, ?2, ?3, ?4);",
            params![database.id, handle.id, handle.rid, handle.self_link],
        )
        .map_err(|err| conflict_or(err, &handle.self_link))?;

        info!("event=store_create module=store status=ok kind=collection");
        Ok(handle)
    }

    fn query_documents(
        &self,
        collection: &CollectionHandle,
        filter: &DocumentFilter,
    ) -> StoreResult<Vec<Document>> {
        if !FIELD_NAME_RE.is_match(&filter.field) {
            return Err(StoreError::BadRequest(format!(
                "unsupported filter field `{}`",
                filter.field
            )));
        }
        let (predicate, bound) = filter_predicate(&filter.value)?;
        let path = format!("$.{}", filter.field);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE collection_link = ?1 AND {predicate}
             ORDER BY rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![collection.self_link, path, bound])?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn create_document(
        &self,
        collection: &CollectionHandle,
        body: Map<String, Value>,
    ) -> StoreResult<Document> {
        let mut body = strip_system_properties(body);
        let id = match body.get("id").cloned() {
            Some(Value::String(id)) => id,
            Some(_) => return Err(StoreError::BadRequest("document id must be a string".into())),
            None => {
                let id = Uuid::new_v4().to_string();
                body.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        require_resource_id(&id, "document")?;

        let conn = self.lock()?;
        if !row_exists(
            &conn,
            "SELECT 1 FROM collections WHERE self_link = ?1;",
            &collection.self_link,
        )? {
            return Err(StoreError::NotFound(collection.self_link.clone()));
        }

        let self_link = format!("{}/docs/{id}", collection.self_link);
        let seq = next_sequence(&conn)?;
        conn.execute(
            "INSERT INTO documents (self_link, collection_link, id, rid, body, etag, ts, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, CAST(strftime('%s', 'now') AS INTEGER), ?7);",
            params![
                self_link,
                collection.self_link,
                id,
                new_rid(),
                encode_body(&body)?,
                new_etag(),
                seq,
            ],
        )
        .map_err(|err| conflict_or(err, &self_link))?;

        load_document(&conn, &self_link)
    }

    fn replace_document(
        &self,
        self_link: &str,
        body: Map<String, Value>,
        options: &RequestOptions,
    ) -> StoreResult<Document> {
        let conn = self.lock()?;
        replace_locked(&conn, self_link, body, options)
    }

    fn delete_document(&self, self_link: &str, options: &RequestOptions) -> StoreResult<()> {
        let conn = self.lock()?;
        check_precondition(&conn, self_link, options)?;

        let changed = conn.execute("DELETE FROM documents WHERE self_link = ?1;", [self_link])?;
        if changed == 0 {
            return Err(StoreError::NotFound(self_link.to_string()));
        }
        Ok(())
    }

    fn find_procedure(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> StoreResult<Option<ProcedureHandle>> {
        let conn = self.lock()?;
        let handle = conn
            .query_row(
                "SELECT id, rid, self_link, body FROM procedures
                 WHERE collection_link = ?1 AND id = ?2;",
                params![collection.self_link, id],
                parse_procedure_row,
            )
            .optional()?;
        Ok(handle)
    }

    fn create_procedure(
        &self,
        collection: &CollectionHandle,
        id: &str,
        body: &str,
    ) -> StoreResult<ProcedureHandle> {
        require_resource_id(id, "procedure")?;
        ProcedureScript::parse(body).map_err(|err| StoreError::BadRequest(err.to_string()))?;

        let conn = self.lock()?;
        if !row_exists(
            &conn,
            "SELECT 1 FROM collections WHERE self_link = ?1;",
            &collection.self_link,
        )? {
            return Err(StoreError::NotFound(collection.self_link.clone()));
        }

        let handle = ProcedureHandle {
            id: id.to_string(),
            rid: new_rid(),
            self_link: format!("{}/sprocs/{id}", collection.self_link),
            body: body.to_string(),
        };
        conn.execute(
            "INSERT INTO procedures (self_link, collection_link, id, rid, body)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                handle.self_link,
                collection.self_link,
                handle.id,
                handle.rid,
                handle.body
            ],
        )
        .map_err(|err| conflict_or(err, &handle.self_link))?;

        info!("event=store_create module=store status=ok kind=procedure");
        Ok(handle)
    }

    fn execute_procedure(
        &self,
        procedure: &ProcedureHandle,
        args: Vec<Value>,
    ) -> StoreResult<Value> {
        let started_at = Instant::now();
        let conn = self.lock()?;

        let (stored_body, collection_link): (String, String) = conn
            .query_row(
                "SELECT body, collection_link FROM procedures WHERE self_link = ?1;",
                [procedure.self_link.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(procedure.self_link.clone()))?;
        let script = ProcedureScript::parse(&stored_body).map_err(StoreError::Procedure)?;

        let mut ctx = SqliteProcedureContext {
            conn: &*conn,
            collection_link,
            remaining: self.budget.max_writes_per_invocation,
            accepted: 0,
        };
        match execute_script(&script, &args, &mut ctx) {
            Ok(response) => {
                debug!(
                    "event=procedure_execute module=store status=ok accepted={} duration_ms={}",
                    ctx.accepted,
                    started_at.elapsed().as_millis()
                );
                Ok(response)
            }
            Err(err) => {
                warn!(
                    "event=procedure_execute module=store status=error accepted={} duration_ms={} error={}",
                    ctx.accepted,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(StoreError::Procedure(err))
            }
        }
    }
}

/// Replace access granted to a running procedure, scoped to the collection
/// the procedure is installed on.
struct SqliteProcedureContext<'conn> {
    conn: &'conn Connection,
    collection_link: String,
    remaining: Option<usize>,
    accepted: usize,
}

impl SqliteProcedureContext<'_> {
    fn owns(&self, self_link: &str) -> bool {
        self_link
            .strip_prefix(self.collection_link.as_str())
            .and_then(|rest| rest.strip_prefix("/docs/"))
            .is_some_and(|id| !id.is_empty() && !id.contains('/'))
    }
}

impl ProcedureContext for SqliteProcedureContext<'_> {
    fn try_set_field(
        &mut self,
        self_link: &str,
        field: &str,
        value: &Value,
    ) -> Result<ReplaceOutcome, StoreError> {
        if !self.owns(self_link) {
            return Err(StoreError::BadRequest(format!(
                "`{self_link}` is outside collection `{}`",
                self.collection_link
            )));
        }
        if self.remaining == Some(0) {
            return Ok(ReplaceOutcome::NotAccepted);
        }

        // Rebuild from the stored body; the caller's copy may be stale.
        let current = load_document(self.conn, self_link)?;
        let options = RequestOptions {
            if_match: current.etag().map(str::to_string),
        };
        let mut body = current.into_user_fields();
        body.insert(field.to_string(), value.clone());

        let document = replace_locked(self.conn, self_link, body, &options)?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        self.accepted += 1;
        Ok(ReplaceOutcome::Acknowledged(document))
    }
}

fn replace_locked(
    conn: &Connection,
    self_link: &str,
    body: Map<String, Value>,
    options: &RequestOptions,
) -> StoreResult<Document> {
    let current_id = check_precondition(conn, self_link, options)?;
    let body = strip_system_properties(body);
    match body.get("id") {
        Some(Value::String(id)) if *id == current_id => {}
        Some(_) | None => {
            return Err(StoreError::BadRequest(format!(
                "replace body id must equal `{current_id}`"
            )))
        }
    }

    let seq = next_sequence(conn)?;
    let changed = conn.execute(
        "UPDATE documents
         SET
            body = ?1,
            etag = ?2,
            ts = CAST(strftime('%s', 'now') AS INTEGER),
            seq = ?3
         WHERE self_link = ?4;",
        params![encode_body(&body)?, new_etag(), seq, self_link],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(self_link.to_string()));
    }

    load_document(conn, self_link)
}

/// Returns the stored document id after checking existence and if-match.
fn check_precondition(
    conn: &Connection,
    self_link: &str,
    options: &RequestOptions,
) -> StoreResult<String> {
    let (id, etag): (String, String) = conn
        .query_row(
            "SELECT id, etag FROM documents WHERE self_link = ?1;",
            [self_link],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(self_link.to_string()))?;

    if let Some(expected) = options.if_match.as_deref() {
        if expected != etag {
            return Err(StoreError::PreconditionFailed(self_link.to_string()));
        }
    }
    Ok(id)
}

fn load_document(conn: &Connection, self_link: &str) -> StoreResult<Document> {
    let mut stmt = conn.prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE self_link = ?1;"))?;
    let mut rows = stmt.query([self_link])?;
    match rows.next()? {
        Some(row) => parse_document_row(row),
        None => Err(StoreError::NotFound(self_link.to_string())),
    }
}

fn parse_document_row(row: &Row<'_>) -> StoreResult<Document> {
    let self_link: String = row.get("self_link")?;
    let body_text: String = row.get("body")?;
    let mut body = match serde_json::from_str::<Value>(&body_text) {
        Ok(Value::Object(body)) => body,
        Ok(_) => {
            return Err(StoreError::InvalidData(format!(
                "document `{self_link}` body is not a JSON object"
            )))
        }
        Err(err) => {
            return Err(StoreError::InvalidData(format!(
                "document `{self_link}` body is not valid JSON: {err}"
            )))
        }
    };

    body.insert(RID_PROPERTY.to_string(), Value::String(row.get("rid")?));
    body.insert(ETAG_PROPERTY.to_string(), Value::String(row.get("etag")?));
    body.insert(TIMESTAMP_PROPERTY.to_string(), Value::from(row.get::<_, i64>("ts")?));
    body.insert(SEQUENCE_PROPERTY.to_string(), Value::from(row.get::<_, i64>("seq")?));
    body.insert(SELF_LINK_PROPERTY.to_string(), Value::String(self_link));
    Ok(Document::from_map(body))
}

fn parse_procedure_row(row: &Row<'_>) -> rusqlite::Result<ProcedureHandle> {
    Ok(ProcedureHandle {
        id: row.get(0)?,
        rid: row.get(1)?,
        self_link: row.get(2)?,
        body: row.get(3)?,
    })
}

/// SQL predicate on `json_type`/`json_extract` for one filter value.
///
/// Parameter `?2` is the JSON path, `?3` the bound value.
fn filter_predicate(value: &Value) -> StoreResult<(&'static str, SqlValue)> {
    match value {
        Value::Bool(flag) => Ok((
            "json_type(body, ?2) = ?3",
            SqlValue::Text(if *flag { "true" } else { "false" }.to_string()),
        )),
        Value::Null => Ok(("json_type(body, ?2) = ?3", SqlValue::Text("null".to_string()))),
        Value::String(text) => Ok((
            "json_type(body, ?2) = 'text' AND json_extract(body, ?2) = ?3",
            SqlValue::Text(text.clone()),
        )),
        Value::Number(number) => {
            let bound = match number.as_i64() {
                Some(integer) => SqlValue::Integer(integer),
                None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
            };
            Ok((
                "json_type(body, ?2) IN ('integer', 'real') AND json_extract(body, ?2) = ?3",
                bound,
            ))
        }
        Value::Array(_) | Value::Object(_) => Err(StoreError::BadRequest(
            "filter value must be a scalar".to_string(),
        )),
    }
}

fn next_sequence(conn: &Connection) -> StoreResult<i64> {
    let seq = conn.query_row(
        "UPDATE store_meta SET value = value + 1 WHERE key = 'write_seq' RETURNING value;",
        [],
        |row| row.get(0),
    )?;
    Ok(seq)
}

fn row_exists(conn: &Connection, sql: &str, key: &str) -> StoreResult<bool> {
    Ok(conn.query_row(sql, [key], |_| Ok(())).optional()?.is_some())
}

fn encode_body(body: &Map<String, Value>) -> StoreResult<String> {
    serde_json::to_string(body).map_err(|err| StoreError::BadRequest(err.to_string()))
}

fn require_resource_id(id: &str, kind: &str) -> StoreResult<()> {
    if id.trim().is_empty() || id.contains(['/', '\\', '?', '#']) {
        return Err(StoreError::BadRequest(format!("invalid {kind} id `{id}`")));
    }
    Ok(())
}

fn conflict_or(err: rusqlite::Error, link: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(link.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

fn new_rid() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_etag() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::SqliteDocumentStore;
    use crate::store::{
        open_store_in_memory, DocumentFilter, DocumentStore, RequestOptions, StoreError,
    };
    use serde_json::{json, Map, Value};

    fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(open_store_in_memory().unwrap())
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn duplicate_database_create_is_conflict() {
        let store = store();
        store.create_database("todo").unwrap();
        let err = store.create_database("todo").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(link) if link == "dbs/todo"));
    }

    #[test]
    fn write_sequence_increases_across_writes() {
        let store = store();
        let db = store.create_database("todo").unwrap();
        let coll = store.create_collection(&db, "items").unwrap();

        let first = store
            .create_document(&coll, body(json!({"id": "a", "isComplete": false})))
            .unwrap();
        let second = store
            .create_document(&coll, body(json!({"id": "b", "isComplete": false})))
            .unwrap();
        let replaced = store
            .replace_document(
                first.self_link().unwrap(),
                body(json!({"id": "a", "isComplete": true})),
                &RequestOptions::default(),
            )
            .unwrap();

        assert!(first.sequence() < second.sequence());
        assert!(second.sequence() < replaced.sequence());
        assert_ne!(first.etag(), replaced.etag());
    }

    #[test]
    fn bool_filter_does_not_match_integers_or_missing_fields() {
        let store = store();
        let db = store.create_database("todo").unwrap();
        let coll = store.create_collection(&db, "items").unwrap();
        for doc in [
            json!({"id": "a", "isComplete": false}),
            json!({"id": "b", "isComplete": 0}),
            json!({"id": "c"}),
            json!({"id": "d", "isComplete": true}),
        ] {
            store.create_document(&coll, body(doc)).unwrap();
        }

        let found = store
            .query_documents(&coll, &DocumentFilter::field_eq("isComplete", false))
            .unwrap();
        let ids: Vec<_> = found.iter().filter_map(|doc| doc.id()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn filter_rejects_path_like_fields() {
        let store = store();
        let db = store.create_database("todo").unwrap();
        let coll = store.create_collection(&db, "items").unwrap();
        let err = store
            .query_documents(&coll, &DocumentFilter::field_eq("a.b", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
    }

    #[test]
    fn create_procedure_rejects_unparseable_body() {
        let store = store();
        let db = store.create_database("todo").unwrap();
        let coll = store.create_collection(&db, "items").unwrap();
        let err = store
            .create_procedure(&coll, "MarkAll", "function markAll(docs) {}")
            .unwrap_err();
        assert!(matches!(err, StoreError::BadRequest(_)));
    }
}
