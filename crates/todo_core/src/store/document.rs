//! Raw document and container handles returned by a document store.
//!
//! # Responsibility
//! - Carry untyped document bodies together with store system properties.
//! - Provide opaque, cloneable handles for databases, collections and
//!   procedures.
//!
//! # Invariants
//! - System properties are always `_`-prefixed and owned by the store.
//! - `strip_system_properties` removes exactly the store-owned keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Store-assigned resource id.
pub const RID_PROPERTY: &str = "_rid";
/// Addressable link used by replace/delete calls.
pub const SELF_LINK_PROPERTY: &str = "_self";
/// Opaque version tag, changes on every write.
pub const ETAG_PROPERTY: &str = "_etag";
/// Unix epoch seconds of the last write.
pub const TIMESTAMP_PROPERTY: &str = "_ts";
/// Store-wide monotonic write sequence of the last write.
pub const SEQUENCE_PROPERTY: &str = "_seq";

const SYSTEM_PROPERTIES: &[&str] = &[
    RID_PROPERTY,
    SELF_LINK_PROPERTY,
    ETAG_PROPERTY,
    TIMESTAMP_PROPERTY,
    SEQUENCE_PROPERTY,
];

/// Handle to a logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseHandle {
    pub id: String,
    pub rid: String,
    pub self_link: String,
}

/// Handle to a collection inside one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionHandle {
    pub id: String,
    pub rid: String,
    pub self_link: String,
}

/// Handle to a procedure installed on one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureHandle {
    pub id: String,
    pub rid: String,
    pub self_link: String,
    /// Script body as stored.
    pub body: String,
}

/// Untyped stored record: user fields plus system properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    body: Map<String, Value>,
}

impl Document {
    pub fn from_map(body: Map<String, Value>) -> Self {
        Self { body }
    }

    pub fn id(&self) -> Option<&str> {
        self.string_property("id")
    }

    pub fn self_link(&self) -> Option<&str> {
        self.string_property(SELF_LINK_PROPERTY)
    }

    pub fn etag(&self) -> Option<&str> {
        self.string_property(ETAG_PROPERTY)
    }

    pub fn sequence(&self) -> Option<u64> {
        self.body.get(SEQUENCE_PROPERTY).and_then(Value::as_u64)
    }

    /// Returns user fields only.
    pub fn into_user_fields(self) -> Map<String, Value> {
        strip_system_properties(self.body)
    }

    fn string_property(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Object(value.body)
    }
}

/// Removes store-owned keys from a document body.
pub fn strip_system_properties(mut body: Map<String, Value>) -> Map<String, Value> {
    for key in SYSTEM_PROPERTIES {
        body.remove(*key);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::{strip_system_properties, Document};
    use serde_json::json;

    #[test]
    fn accessors_read_system_properties() {
        let doc: Document = serde_json::from_value(json!({
            "id": "a1",
            "_self": "dbs/todo/colls/items/docs/a1",
            "_etag": "e-1",
            "_seq": 7
        }))
        .unwrap();

        assert_eq!(doc.id(), Some("a1"));
        assert_eq!(doc.self_link(), Some("dbs/todo/colls/items/docs/a1"));
        assert_eq!(doc.etag(), Some("e-1"));
        assert_eq!(doc.sequence(), Some(7));
    }

    #[test]
    fn strip_keeps_user_fields_only() {
        let body = json!({
            "id": "a1",
            "name": "n",
            "_rid": "r",
            "_self": "s",
            "_etag": "e",
            "_ts": 1,
            "_seq": 2
        });
        let stripped = strip_system_properties(body.as_object().cloned().unwrap());
        assert_eq!(stripped.len(), 2);
        assert!(stripped.contains_key("id"));
        assert!(stripped.contains_key("name"));
    }
}
