mod common;

use common::{body, test_config, CountingStore};
use serde_json::json;
use std::sync::Arc;
use todo_core::{
    CoreError, Item, ItemValidationError, RequestOptions, StoreConfig, StoreError, TodoService,
};

fn service() -> TodoService {
    TodoService::new(Arc::new(CountingStore::unbounded()), &test_config()).unwrap()
}

#[test]
fn create_and_get_roundtrip() {
    let service = service();
    let mut item = Item::with_id("a1", "buy milk");
    item.description = Some("2 litres".to_string());
    item.due_date = Some("2026-10-20".to_string());
    item.extra.insert("priority".to_string(), json!(2));

    let document = service.create_item(&item).unwrap();
    assert_eq!(document.id(), Some("a1"));
    assert!(document.self_link().is_some());
    assert!(document.etag().is_some());

    let loaded = service.get_item("a1").unwrap().unwrap();
    assert_eq!(loaded, item);
}

#[test]
fn get_missing_item_is_none() {
    let service = service();
    assert!(service.get_item("missing").unwrap().is_none());
}

#[test]
fn list_incomplete_excludes_completed_items() {
    let service = service();
    let open = Item::with_id("open", "open task");
    let mut done = Item::with_id("done", "finished task");
    done.mark_complete();
    service.create_item(&open).unwrap();
    service.create_item(&done).unwrap();

    let incomplete = service.list_incomplete().unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].id, "open");
}

#[test]
fn update_is_full_document_replace() {
    let service = service();
    let mut item = Item::with_id("a1", "draft");
    item.description = Some("old description".to_string());
    service.create_item(&item).unwrap();

    item.name = "final".to_string();
    item.description = None;
    item.mark_complete();
    service.update_item(&item).unwrap();

    let loaded = service.get_item("a1").unwrap().unwrap();
    assert_eq!(loaded.name, "final");
    assert_eq!(loaded.description, None);
    assert!(loaded.completed);
    assert!(service.list_incomplete().unwrap().is_empty());
}

#[test]
fn update_missing_item_is_not_found_and_creates_nothing() {
    let service = service();
    let item = Item::with_id("ghost", "never created");

    let err = service.update_item(&item).unwrap_err();
    assert!(matches!(err, CoreError::NotFound(ref id) if id == "ghost"));
    assert!(service.get_item("ghost").unwrap().is_none());
    assert!(service.list_incomplete().unwrap().is_empty());
}

#[test]
fn delete_missing_item_is_not_found() {
    let service = service();
    let err = service.delete_item("ghost").unwrap_err();
    assert!(matches!(err, CoreError::NotFound(ref id) if id == "ghost"));
}

#[test]
fn delete_removes_item() {
    let service = service();
    service.create_item(&Item::with_id("a1", "temp")).unwrap();

    service.delete_item("a1").unwrap();
    assert!(service.get_item("a1").unwrap().is_none());

    let err = service.delete_item("a1").unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[test]
fn duplicate_id_create_is_conflict() {
    let service = service();
    service.create_item(&Item::with_id("a1", "one")).unwrap();

    let err = service.create_item(&Item::with_id("a1", "two")).unwrap_err();
    assert!(matches!(err, CoreError::Conflict(ref id) if id == "a1"));
    assert_eq!(service.get_item("a1").unwrap().unwrap().name, "one");
}

#[test]
fn invalid_item_is_rejected_before_write() {
    let service = service();
    let err = service.create_item(&Item::with_id("a/b", "bad id")).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ItemValidationError::InvalidIdCharacter { .. })
    ));
    assert!(service.list_incomplete().unwrap().is_empty());
}

#[test]
fn stale_etag_replace_is_rejected_by_store() {
    let service = service();
    let created = service.create_item(&Item::with_id("a1", "v1")).unwrap();
    let stale_etag = created.etag().unwrap().to_string();

    service.update_item(&Item::with_id("a1", "v2")).unwrap();

    let store = service.resolver().store();
    let err = store
        .replace_document(
            created.self_link().unwrap(),
            body(json!({ "id": "a1", "name": "v3", "isComplete": false })),
            &RequestOptions::if_match(stale_etag),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::PreconditionFailed(_)));
    assert_eq!(service.get_item("a1").unwrap().unwrap().name, "v2");
}

#[test]
fn undecodable_document_is_invalid_data() {
    let service = service();
    let collection = service.resolver().collection().unwrap().clone();
    service
        .resolver()
        .store()
        .create_document(&collection, body(json!({ "id": "raw", "isComplete": "no" })))
        .unwrap();

    let err = service.get_item("raw").unwrap_err();
    assert!(matches!(err, CoreError::InvalidData(_)));
}

#[test]
fn file_backed_store_persists_items_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("todo.db");
    let config = StoreConfig::new(
        format!("sqlite://{}", path.display()),
        "local-key",
        "ToDoList",
        "Items",
    );

    {
        let service = TodoService::connect(&config).unwrap();
        service.create_item(&Item::with_id("a1", "persisted")).unwrap();
    }

    let service = TodoService::connect(&config).unwrap();
    let loaded = service.get_item("a1").unwrap().unwrap();
    assert_eq!(loaded.name, "persisted");
}

#[test]
fn connect_rejects_invalid_config() {
    let mut config = test_config();
    config.auth_key = String::new();

    let err = TodoService::connect(&config)
        .err()
        .expect("empty auth key must fail");
    assert!(matches!(err, CoreError::Config(_)));
}
