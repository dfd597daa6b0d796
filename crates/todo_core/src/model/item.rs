//! Item domain model.
//!
//! # Responsibility
//! - Define the canonical todo record persisted as one store document.
//! - Preserve free-form fields across read/replace round trips.
//!
//! # Invariants
//! - `id` is non-empty and never contains `/`, `\`, `?` or `#`.
//! - `completed` is serialized as `isComplete`; it is the only field the
//!   bulk completion procedure touches.
//! - Replace is a full overwrite, so unknown fields must survive in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stored name of the completion flag.
pub const COMPLETED_FIELD: &str = "isComplete";

/// Task record stored as one document in the item collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Store-unique identity.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form due date as entered by the caller (ISO 8601 recommended).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(rename = "isComplete", default)]
    pub completed: bool,
    /// Any additional fields present on the stored document.
    ///
    /// Store system properties (`_self`, `_etag`, ...) are stripped by the
    /// repository before they reach this map.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Validation failures detected before any store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    EmptyId,
    InvalidIdCharacter { id: String, character: char },
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "item id cannot be empty"),
            Self::InvalidIdCharacter { id, character } => {
                write!(f, "item id `{id}` contains reserved character `{character}`")
            }
        }
    }
}

impl Error for ItemValidationError {}

impl Item {
    /// Creates an incomplete item with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    /// Creates an incomplete item with a caller-provided id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            due_date: None,
            completed: false,
            extra: Map::new(),
        }
    }

    pub fn mark_complete(&mut self) {
        self.completed = true;
    }

    /// Checks identity rules enforced before create/update.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.id.trim().is_empty() {
            return Err(ItemValidationError::EmptyId);
        }
        if let Some(character) = self
            .id
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '?' | '#'))
        {
            return Err(ItemValidationError::InvalidIdCharacter {
                id: self.id.clone(),
                character,
            });
        }
        Ok(())
    }
}
